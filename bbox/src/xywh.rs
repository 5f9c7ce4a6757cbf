use super::{Rect, HW, TLBR};
use crate::common::*;

/// Pixel rectangle in left, top, width, height order.
///
/// The derived ordering compares `x`, then `y`, `w` and `h`. It is used as a
/// stable tie breaker when rectangles are sorted by score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct XYWH<T> {
    pub(crate) x: T,
    pub(crate) y: T,
    pub(crate) w: T,
    pub(crate) h: T,
}

impl<T> XYWH<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn try_from_xywh(xywh: [T; 4]) -> Result<Self> {
        let [x, y, w, h] = xywh;
        let zero = T::zero();
        ensure!(w >= zero && h >= zero, "w and h must be non-negative");
        Ok(Self { x, y, w, h })
    }

    pub fn x(&self) -> T {
        self.x
    }

    pub fn y(&self) -> T {
        self.y
    }

    pub fn xywh(&self) -> [T; 4] {
        [self.x, self.y, self.w, self.h]
    }

    /// Clip the rectangle to an image of the given size.
    ///
    /// Returns `None` if nothing of the rectangle lies inside the image.
    pub fn clip_to(&self, size: &HW<T>) -> Option<Self> {
        let image = Self {
            x: T::zero(),
            y: T::zero(),
            w: size.w(),
            h: size.h(),
        };
        let TLBR { t, l, b, r } = crate::RectNum::intersect_with(self, &image)?;
        Some(Self {
            x: l,
            y: t,
            w: r - l,
            h: b - t,
        })
    }
}

impl<T> Rect for XYWH<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn t(&self) -> Self::Type {
        self.y
    }

    fn l(&self) -> Self::Type {
        self.x
    }

    fn b(&self) -> Self::Type {
        self.y + self.h
    }

    fn r(&self) -> Self::Type {
        self.x + self.w
    }

    fn h(&self) -> Self::Type {
        self.h
    }

    fn w(&self) -> Self::Type {
        self.w
    }

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self> {
        let [t, l, b, r] = tlbr;
        ensure!(b >= t && r >= l, "b >= t and r >= l must hold");
        Ok(Self {
            x: l,
            y: t,
            w: r - l,
            h: b - t,
        })
    }
}

impl<T> From<TLBR<T>> for XYWH<T>
where
    T: Copy + Num,
{
    fn from(from: TLBR<T>) -> Self {
        let TLBR { t, l, b, r } = from;
        Self {
            x: l,
            y: t,
            w: r - l,
            h: b - t,
        }
    }
}
