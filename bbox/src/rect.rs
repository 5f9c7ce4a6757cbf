use super::TLBR;
use crate::common::*;

/// The generic rectangle.
pub trait Rect {
    type Type;

    fn t(&self) -> Self::Type;
    fn l(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn r(&self) -> Self::Type;
    fn h(&self) -> Self::Type;
    fn w(&self) -> Self::Type;

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd + Copy,
{
    fn tlbr(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.b(), self.r()]
    }

    fn hw(&self) -> [Self::Type; 2] {
        [self.h(), self.w()]
    }

    fn area(&self) -> <Self::Type as Mul<Self::Type>>::Output {
        self.h() * self.w()
    }

    /// Returns true if the rectangle covers no area.
    fn is_empty(&self) -> bool {
        let zero = Self::Type::zero();
        self.h() <= zero || self.w() <= zero
    }

    /// Compute the intersection in TLBR format, or `None` if the rectangles are disjoint.
    fn intersect_with<R>(&self, other: &R) -> Option<TLBR<Self::Type>>
    where
        R: Rect<Type = Self::Type>,
    {
        let max = |a: Self::Type, b: Self::Type| if a >= b { a } else { b };
        let min = |a: Self::Type, b: Self::Type| if a <= b { a } else { b };

        let t = max(self.t(), other.t());
        let l = max(self.l(), other.l());
        let b = min(self.b(), other.b());
        let r = min(self.r(), other.r());
        (b > t && r > l).then(|| TLBR { t, l, b, r })
    }

    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        self.intersect_with(other)
            .map(|rect| rect.area())
            .unwrap_or_else(Self::Type::zero)
    }

    /// Intersection over union in `f64`. Two empty rectangles have zero IoU.
    fn iou_with<R>(&self, other: &R) -> f64
    where
        R: Rect<Type = Self::Type>,
        Self::Type: ToPrimitive,
    {
        let to_f64 = |value: Self::Type| value.to_f64().unwrap_or(0.0);
        let inter_area = to_f64(self.intersection_area_with(other));
        let union_area = to_f64(self.area()) + to_f64(other.h() * other.w()) - inter_area;
        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd + Copy,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::XYWH;
    use approx::assert_abs_diff_eq;

    #[test]
    fn intersection_of_overlapping_rects() {
        let lhs = XYWH::try_from_xywh([0i64, 0, 4, 4]).unwrap();
        let rhs = XYWH::try_from_xywh([2i64, 2, 4, 4]).unwrap();
        let inter = lhs.intersect_with(&rhs).unwrap();
        assert_eq!(inter.tlbr(), [2, 2, 4, 4]);
        assert_eq!(lhs.intersection_area_with(&rhs), 4);
        assert_abs_diff_eq!(lhs.iou_with(&rhs), 4.0 / 28.0);
    }

    #[test]
    fn touching_rects_do_not_intersect() {
        let lhs = XYWH::try_from_xywh([0i64, 0, 2, 2]).unwrap();
        let rhs = XYWH::try_from_xywh([2i64, 0, 2, 2]).unwrap();
        assert!(lhs.intersect_with(&rhs).is_none());
        assert_eq!(lhs.iou_with(&rhs), 0.0);
    }

    #[test]
    fn empty_rects_have_zero_iou() {
        let lhs = XYWH::try_from_xywh([1i64, 1, 0, 0]).unwrap();
        assert!(lhs.is_empty());
        assert_eq!(lhs.iou_with(&lhs), 0.0);
    }
}
