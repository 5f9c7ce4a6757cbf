//! Projection of a batch of predicted masks into classified region proposals.

use crate::{
    batch::{check_class_masks, ClassMask},
    common::*,
    matching::{GroundTruthMatcher, GroundTruthRegion},
    patch::{DroppedRegionPolicy, PatchSampler},
    region::{RegionExtractor, RegionFilter, Rectangle},
};

/// A region proposal of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub rect: Rectangle,
    /// The image of the batch the region is extracted from.
    pub image_index: usize,
    pub true_class: TrueClass,
}

/// The regions of a batch in image order, then extraction order.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Patches in `[N, ph, pw]` layout, row aligned with `regions`.
    pub patches: Array3<f32>,
    pub regions: Vec<Region>,
    /// The index of the matched ground truth region within its image.
    pub found_map: Vec<Option<usize>>,
    /// Ground truth regions per image.
    pub ground_truth: Vec<Vec<GroundTruthRegion>>,
    /// Found flags per image, aligned with `ground_truth`.
    pub found: Vec<Vec<bool>>,
    pub batch_size: usize,
}

impl Projection {
    /// Returns true if the batch yields no region to classify.
    pub fn not_enough_rects(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn rectangles(&self) -> Vec<Rectangle> {
        self.regions.iter().map(|region| region.rect).collect()
    }

    pub fn image_indices(&self) -> Vec<usize> {
        self.regions.iter().map(|region| region.image_index).collect()
    }

    pub fn true_classes(&self) -> Vec<TrueClass> {
        self.regions.iter().map(|region| region.true_class).collect()
    }

    /// Row indices and true classes of the matched regions.
    pub fn matched(&self) -> impl Iterator<Item = (usize, ClassId)> + '_ {
        self.regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| Some((index, region.true_class.class()?)))
    }

    pub fn num_matched(&self) -> usize {
        self.matched().count()
    }

    pub fn num_ground_truth(&self) -> usize {
        self.ground_truth.iter().map(|regions| regions.len()).sum()
    }

    pub fn num_found(&self) -> usize {
        self.found.iter().flatten().filter(|&&found| found).count()
    }
}

#[derive(Debug, Clone)]
pub struct ProjectorInit {
    pub patch_size: HW<usize>,
    pub filter: RegionFilter,
    pub policy: DroppedRegionPolicy,
}

impl ProjectorInit {
    pub fn new(patch_size: HW<usize>) -> Self {
        Self {
            patch_size,
            filter: Default::default(),
            policy: Default::default(),
        }
    }

    pub fn build(self) -> Result<BatchProjector> {
        let Self {
            patch_size,
            filter,
            policy,
        } = self;

        Ok(BatchProjector {
            extractor: RegionExtractor::new(filter),
            sampler: PatchSampler::new(patch_size, policy)?,
            matcher: GroundTruthMatcher::new(),
        })
    }
}

/// Runs region extraction, ground truth matching and patch sampling on a batch.
#[derive(Debug, Clone)]
pub struct BatchProjector {
    extractor: RegionExtractor,
    sampler: PatchSampler,
    matcher: GroundTruthMatcher,
}

impl BatchProjector {
    pub fn extractor(&self) -> &RegionExtractor {
        &self.extractor
    }

    pub fn sampler(&self) -> &PatchSampler {
        &self.sampler
    }

    pub fn project(
        &self,
        images: ArrayView3<'_, f32>,
        predicted_masks: ArrayView3<'_, bool>,
        class_masks: &[ClassMask],
        filter_masks: bool,
    ) -> Result<Projection> {
        ensure!(
            images.dim() == predicted_masks.dim(),
            "images and predicted masks shapes mismatch: {:?} vs {:?}",
            images.dim(),
            predicted_masks.dim()
        );
        check_class_masks(images, class_masks)?;
        let batch_size = images.len_of(Axis(0));

        let mut candidates = vec![];
        let mut ground_truth = Vec::with_capacity(batch_size);

        for (image_index, (mask, class_mask)) in
            izip!(predicted_masks.outer_iter(), class_masks).enumerate()
        {
            let rects: Vec<Rectangle> = self
                .extractor
                .extract(mask, filter_masks)?
                .into_iter()
                .map(|region| region.rect)
                .collect();
            let matching = self.matcher.match_image(class_mask, &rects)?;

            candidates.extend(
                izip!(rects, matching.true_classes, matching.matched_regions).map(
                    |(rect, true_class, matched)| {
                        let region = Region {
                            rect,
                            image_index,
                            true_class,
                        };
                        (region, matched)
                    },
                ),
            );
            ground_truth.push(matching.ground_truth);
        }

        let rects: Vec<_> = candidates.iter().map(|(region, _)| region.rect).collect();
        let image_indices: Vec<_> = candidates.iter().map(|(region, _)| region.image_index).collect();
        let patch_batch = self.sampler.sample(images, &rects, &image_indices)?;

        if patch_batch.len() < candidates.len() {
            debug!(
                "{} of {} regions are dropped",
                candidates.len() - patch_batch.len(),
                candidates.len()
            );
        }

        // keep only regions that yield a patch
        let (regions, found_map): (Vec<_>, Vec<_>) = patch_batch
            .source_indices
            .iter()
            .map(|&source_index| candidates[source_index].clone())
            .unzip();

        let mut found: Vec<Vec<bool>> = ground_truth
            .iter()
            .map(|regions| vec![false; regions.len()])
            .collect();
        izip!(&regions, &found_map).for_each(|(region, matched)| {
            if let Some(index) = *matched {
                found[region.image_index][index] = true;
            }
        });

        Ok(Projection {
            patches: patch_batch.patches,
            regions,
            found_map,
            ground_truth,
            found,
            batch_size,
        })
    }
}
