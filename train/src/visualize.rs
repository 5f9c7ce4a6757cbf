//! Annotated debug images.

use crate::common::*;
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as DrawRect};

/// The tint blended into predicted mask pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskTint {
    Red,
    Green,
}

impl MaskTint {
    fn offset(&self) -> [f32; 3] {
        match self {
            Self::Red => [127.5, 0.0, 0.0],
            Self::Green => [0.0, 127.5, 0.0],
        }
    }
}

/// How a predicted region compares against its matched ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOutcome {
    Correct,
    Wrong,
    Unmatched,
}

impl RegionOutcome {
    pub fn new(true_class: TrueClass, predicted: ClassId) -> Self {
        match true_class {
            TrueClass::Class(class) if class == predicted => Self::Correct,
            TrueClass::Class(_) => Self::Wrong,
            TrueClass::Unmatched => Self::Unmatched,
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        match self {
            Self::Correct => Rgb([0, 255, 0]),
            Self::Wrong => Rgb([255, 0, 0]),
            Self::Unmatched => Rgb([255, 255, 0]),
        }
    }
}

/// Converts a grayscale image with intensities in `[0, 1]` to RGB, with
/// mask pixels halved and tinted.
pub fn blend_mask(image: ArrayView2<'_, f32>, mask: ArrayView2<'_, bool>, tint: MaskTint) -> Result<RgbImage> {
    ensure!(
        image.dim() == mask.dim(),
        "image and mask shapes mismatch: {:?} vs {:?}",
        image.dim(),
        mask.dim()
    );
    let (height, width) = image.dim();
    let offset = tint.offset();

    let canvas = RgbImage::from_fn(width as u32, height as u32, |x, y| {
        let index = [y as usize, x as usize];
        let gray = (image[index] * 255.0).clamp(0.0, 255.0);
        let pixel = if mask[index] {
            let mut channels = [0u8; 3];
            channels
                .iter_mut()
                .zip(offset)
                .for_each(|(channel, offset)| *channel = (gray / 2.0 + offset).round() as u8);
            channels
        } else {
            [gray.round() as u8; 3]
        };
        Rgb(pixel)
    });
    Ok(canvas)
}

/// Draws the outline of each region in the color of its outcome.
pub fn draw_regions(canvas: &mut RgbImage, regions: &[(Rectangle, RegionOutcome)]) {
    regions
        .iter()
        .filter(|(rect, _)| rect.w() > 0 && rect.h() > 0)
        .for_each(|(rect, outcome)| {
            let rect = DrawRect::at(rect.l() as i32, rect.t() as i32).of_size(rect.w() as u32, rect.h() as u32);
            draw_hollow_rect_mut(canvas, rect, outcome.color());
        });
}

/// Renders one debug image per batch image.
///
/// With classified regions, masks are tinted red and each region is outlined
/// by outcome. Otherwise masks are tinted green.
pub fn render_batch(
    images: ArrayView3<'_, f32>,
    predicted_masks: ArrayView3<'_, bool>,
    regions: Option<(&Projection, ArrayView2<'_, f32>)>,
) -> Result<Vec<RgbImage>> {
    let batch_size = images.len_of(Axis(0));
    let mut grouped: Vec<Vec<(Rectangle, RegionOutcome)>> = vec![vec![]; batch_size];

    let tint = match regions {
        Some((projection, logits)) if !projection.not_enough_rects() => {
            ensure!(
                logits.nrows() == projection.num_regions(),
                "expect logits for {} regions, but get {} rows",
                projection.num_regions(),
                logits.nrows()
            );
            for (region, row) in izip!(&projection.regions, logits.outer_iter()) {
                let predicted = segdet::utils::argmax(row)
                    .ok_or_else(|| format_err!("logits must not be empty"))?;
                let outcome = RegionOutcome::new(region.true_class, ClassId(predicted));
                grouped
                    .get_mut(region.image_index)
                    .ok_or_else(|| format_err!("image index {} out of range", region.image_index))?
                    .push((region.rect, outcome));
            }
            MaskTint::Red
        }
        _ => MaskTint::Green,
    };

    izip!(images.outer_iter(), predicted_masks.outer_iter(), &grouped)
        .map(|(image, mask, regions)| -> Result<_> {
            let mut canvas = blend_mask(image, mask, tint)?;
            draw_regions(&mut canvas, regions);
            Ok(canvas)
        })
        .try_collect()
}
