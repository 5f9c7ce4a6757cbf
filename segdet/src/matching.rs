//! Association of predicted rectangles with ground truth regions.

use crate::{
    batch::ClassMask,
    common::*,
    region::{label_components, LabeledComponents, Rectangle},
};

/// A connected component of equally labelled pixels in a class mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundTruthRegion {
    pub rect: Rectangle,
    pub class: ClassId,
    /// The number of pixels of the region.
    pub area: usize,
}

/// The matching result of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMatching {
    /// The assigned class of each predicted rectangle.
    pub true_classes: Vec<TrueClass>,
    /// The matched ground truth region index of each predicted rectangle.
    pub matched_regions: Vec<Option<usize>>,
    pub ground_truth: Vec<GroundTruthRegion>,
    /// Whether each ground truth region is matched by some prediction.
    pub found: Vec<bool>,
}

impl ImageMatching {
    pub fn num_found(&self) -> usize {
        self.found.iter().filter(|&&found| found).count()
    }
}

/// Matches predicted rectangles to ground truth regions by pixel overlap.
///
/// A rectangle takes the class of the region with the most pixels inside the
/// rectangle. Ties go to the region discovered first in raster order. A
/// rectangle covering no labelled pixel is unmatched.
#[derive(Debug, Clone, Default)]
pub struct GroundTruthMatcher;

impl GroundTruthMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Lists ground truth regions in raster discovery order.
    pub fn ground_truth_regions(&self, class_mask: &ClassMask) -> Result<Vec<GroundTruthRegion>> {
        let (regions, _) = self.label(class_mask)?;
        Ok(regions)
    }

    pub fn match_image(&self, class_mask: &ClassMask, rects: &[Rectangle]) -> Result<ImageMatching> {
        let (ground_truth, indices) = self.label(class_mask)?;
        let (height, width) = class_mask.dim();
        let image_size = HW::try_from_hw([height as i64, width as i64])?;

        let matched_regions: Vec<Option<usize>> = rects
            .iter()
            .map(|rect| {
                let clipped = rect.clip_to(&image_size)?;
                let [x, y, w, h] = clipped.xywh();
                let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);

                let mut overlaps = vec![0usize; ground_truth.len()];
                indices
                    .slice(s![y..(y + h), x..(x + w)])
                    .iter()
                    .flatten()
                    .for_each(|&index| overlaps[index] += 1);

                overlaps
                    .into_iter()
                    .enumerate()
                    .fold(None, |best: Option<(usize, usize)>, (index, overlap)| match best {
                        Some((_, best_overlap)) if best_overlap >= overlap => best,
                        _ if overlap == 0 => best,
                        _ => Some((index, overlap)),
                    })
                    .map(|(index, _)| index)
            })
            .collect();

        let true_classes: Vec<TrueClass> = matched_regions
            .iter()
            .map(|matched| TrueClass::from(matched.map(|index| ground_truth[index].class)))
            .collect();

        let mut found = vec![false; ground_truth.len()];
        matched_regions.iter().flatten().for_each(|&index| found[index] = true);

        Ok(ImageMatching {
            true_classes,
            matched_regions,
            ground_truth,
            found,
        })
    }

    fn label(&self, class_mask: &ClassMask) -> Result<(Vec<GroundTruthRegion>, Array2<Option<usize>>)> {
        // code 0 is the background, so class c is encoded as c + 1
        let codes: Vec<u32> = class_mask
            .labels()
            .iter()
            .map(|label| -> Result<u32> {
                let code = match label {
                    Some(class) => u32::try_from(class.index() + 1)
                        .with_context(|| format!("class id {} is too large", class))?,
                    None => 0,
                };
                Ok(code)
            })
            .try_collect()?;
        let codes = Array2::from_shape_vec(class_mask.dim(), codes)?;

        let LabeledComponents {
            indices,
            components,
        } = label_components(codes.view())?;

        let regions: Vec<_> = components
            .into_iter()
            .map(|component| GroundTruthRegion {
                rect: component.rect,
                class: ClassId(component.code as usize - 1),
                area: component.area,
            })
            .collect();

        Ok((regions, indices))
    }
}
