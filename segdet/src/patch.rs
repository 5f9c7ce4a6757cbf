//! Fixed-size patch extraction and chunked patch classification.

use crate::{common::*, network::Classifier, region::Rectangle};
use image::{
    imageops::{self, FilterType},
    ImageBuffer, Luma,
};
use std::collections::hash_map::Entry;

type GrayImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// How rectangles without any pixel inside the image are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DroppedRegionPolicy {
    /// The rectangle yields no patch and is removed from the batch.
    Exclude,
    /// The rectangle yields a zero-filled patch.
    Placeholder,
}

impl Default for DroppedRegionPolicy {
    fn default() -> Self {
        Self::Exclude
    }
}

/// Patches in `[N, ph, pw]` layout with their origins.
#[derive(Debug, Clone)]
pub struct PatchBatch {
    pub patches: Array3<f32>,
    /// The image each patch was cropped from.
    pub image_indices: Vec<usize>,
    /// The position of the source rectangle in the input sequence.
    pub source_indices: Vec<usize>,
}

impl PatchBatch {
    pub fn len(&self) -> usize {
        self.source_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_indices.is_empty()
    }
}

/// Crops rectangles out of images and resamples them to a fixed size.
#[derive(Debug, Clone)]
pub struct PatchSampler {
    patch_size: HW<usize>,
    policy: DroppedRegionPolicy,
}

impl PatchSampler {
    pub fn new(patch_size: HW<usize>, policy: DroppedRegionPolicy) -> Result<Self> {
        ensure!(
            patch_size.h() > 0 && patch_size.w() > 0,
            "patch size must be positive, but get {}x{}",
            patch_size.h(),
            patch_size.w()
        );
        Ok(Self { patch_size, policy })
    }

    pub fn patch_size(&self) -> HW<usize> {
        self.patch_size
    }

    pub fn policy(&self) -> DroppedRegionPolicy {
        self.policy
    }

    /// Crops each rectangle from the image at the same position in `image_indices`.
    pub fn sample(
        &self,
        images: ArrayView3<'_, f32>,
        rects: &[Rectangle],
        image_indices: &[usize],
    ) -> Result<PatchBatch> {
        ensure!(
            rects.len() == image_indices.len(),
            "the number of rectangles ({}) and image indices ({}) mismatch",
            rects.len(),
            image_indices.len()
        );

        let (batch_size, height, width) = images.dim();
        let image_size = HW::try_from_hw([height as i64, width as i64])?;
        let patch_h = self.patch_size.h();
        let patch_w = self.patch_size.w();

        // images are converted lazily since most batches touch few images
        let mut gray_images: HashMap<usize, GrayImage> = HashMap::new();
        let mut values: Vec<f32> = Vec::with_capacity(rects.len() * patch_h * patch_w);
        let mut out_image_indices = vec![];
        let mut source_indices = vec![];

        for (source_index, (rect, &image_index)) in izip!(rects, image_indices).enumerate() {
            ensure!(
                image_index < batch_size,
                "image index {} is out of range for a batch of {} images",
                image_index,
                batch_size
            );

            let clipped = rect.clip_to(&image_size).filter(|clipped| !clipped.is_empty());
            let clipped = match (clipped, self.policy) {
                (Some(clipped), _) => Some(clipped),
                (None, DroppedRegionPolicy::Exclude) => {
                    debug!("exclude rectangle {:?} outside of image {}", rect, image_index);
                    continue;
                }
                (None, DroppedRegionPolicy::Placeholder) => {
                    debug!("use placeholder for rectangle {:?} outside of image {}", rect, image_index);
                    None
                }
            };

            match clipped {
                Some(clipped) => {
                    let gray = match gray_images.entry(image_index) {
                        Entry::Occupied(entry) => entry.into_mut(),
                        Entry::Vacant(entry) => {
                            entry.insert(to_gray_image(images.index_axis(Axis(0), image_index))?)
                        }
                    };
                    let [x, y, w, h] = clipped.xywh();
                    let crop = imageops::crop_imm(&*gray, x as u32, y as u32, w as u32, h as u32).to_image();
                    let patch = imageops::resize(&crop, patch_w as u32, patch_h as u32, FilterType::Triangle);
                    values.extend(patch.into_raw());
                }
                None => {
                    values.extend(iter::repeat(0.0).take(patch_h * patch_w));
                }
            }

            out_image_indices.push(image_index);
            source_indices.push(source_index);
        }

        let patches = Array3::from_shape_vec((source_indices.len(), patch_h, patch_w), values)?;

        Ok(PatchBatch {
            patches,
            image_indices: out_image_indices,
            source_indices,
        })
    }
}

fn to_gray_image(image: ArrayView2<'_, f32>) -> Result<GrayImage> {
    let (height, width) = image.dim();
    GrayImage::from_raw(width as u32, height as u32, image.iter().copied().collect())
        .ok_or_else(|| format_err!("unable to build a {}x{} image", height, width))
}

/// Runs the classifier on consecutive chunks of at most `chunk_size` patches
/// and concatenates the logits in input order.
pub fn classify_chunked<C>(
    classifier: &mut C,
    patches: ArrayView3<'_, f32>,
    chunk_size: usize,
    train: bool,
) -> Result<Array2<f32>>
where
    C: Classifier + ?Sized,
{
    ensure!(chunk_size > 0, "chunk size must be positive");
    ensure!(
        patches.len_of(Axis(0)) > 0,
        "the classifier must not be called on an empty patch batch"
    );

    let chunks: Vec<Array2<f32>> = patches
        .axis_chunks_iter(Axis(0), chunk_size)
        .map(|chunk| -> Result<_> {
            let logits = classifier.forward_t(chunk, train)?;
            ensure!(
                logits.nrows() == chunk.len_of(Axis(0)),
                "the classifier returns {} rows for {} patches",
                logits.nrows(),
                chunk.len_of(Axis(0))
            );
            Ok(logits)
        })
        .try_collect()?;

    let views: Vec<_> = chunks.iter().map(|chunk| chunk.view()).collect();
    let logits = ndarray::concatenate(Axis(0), &views)?;
    Ok(logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn rect(xywh: [i64; 4]) -> Rectangle {
        Rectangle::try_from_xywh(xywh).unwrap()
    }

    fn sampler(policy: DroppedRegionPolicy) -> PatchSampler {
        PatchSampler::new(HW::try_from_hw([4, 4]).unwrap(), policy).unwrap()
    }

    #[test]
    fn constant_region_resamples_to_constant_patch() {
        let mut images = Array3::zeros((2, 8, 8));
        images.slice_mut(s![1, 2..6, 2..6]).fill(0.75);

        let batch = sampler(DroppedRegionPolicy::Exclude)
            .sample(images.view(), &[rect([2, 2, 4, 4]), rect([3, 3, 2, 2])], &[1, 1])
            .unwrap();

        assert_eq!(batch.patches.dim(), (2, 4, 4));
        assert_eq!(batch.image_indices, vec![1, 1]);
        assert_eq!(batch.source_indices, vec![0, 1]);
        batch.patches.iter().for_each(|&value| {
            assert_abs_diff_eq!(value, 0.75, epsilon = 1e-5);
        });
    }

    #[test]
    fn out_of_bounds_rect_is_excluded() {
        let images = Array3::zeros((1, 8, 8));
        let batch = sampler(DroppedRegionPolicy::Exclude)
            .sample(
                images.view(),
                &[rect([0, 0, 2, 2]), rect([10, 10, 2, 2]), rect([4, 4, 0, 3])],
                &[0, 0, 0],
            )
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.source_indices, vec![0]);
    }

    #[test]
    fn out_of_bounds_rect_gets_placeholder() {
        let images = Array3::from_elem((1, 8, 8), 0.5);
        let batch = sampler(DroppedRegionPolicy::Placeholder)
            .sample(images.view(), &[rect([10, 10, 2, 2])], &[0])
            .unwrap();
        assert_eq!(batch.source_indices, vec![0]);
        assert!(batch.patches.iter().all(|&value| value == 0.0));
    }

    #[test]
    fn rect_across_border_is_clipped() {
        let images = Array3::from_shape_fn((1, 8, 8), |(_, y, x)| (y * 8 + x) as f32 / 64.0);
        let batch = sampler(DroppedRegionPolicy::Exclude)
            .sample(images.view(), &[rect([4, 2, 6, 4]), rect([-3, -1, 7, 5])], &[0, 0])
            .unwrap();
        assert_eq!(batch.source_indices, vec![0, 1]);

        // both clip to 4x4 crops, which match the patch size
        let expected = [images.slice(s![0, 2..6, 4..8]), images.slice(s![0, 0..4, 0..4])];
        for (patch, expected) in izip!(batch.patches.outer_iter(), expected) {
            for (&value, &expected) in izip!(patch.iter(), expected.iter()) {
                assert_abs_diff_eq!(value, expected, epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn clipped_strip_is_stretched_to_patch() {
        let mut images = Array3::zeros((1, 8, 8));
        images.slice_mut(s![0, .., 6..]).fill(0.9);
        let batch = sampler(DroppedRegionPolicy::Exclude)
            .sample(images.view(), &[rect([6, -4, 5, 16])], &[0])
            .unwrap();
        assert_eq!(batch.patches.dim(), (1, 4, 4));
        batch.patches.iter().for_each(|&value| {
            assert_abs_diff_eq!(value, 0.9, epsilon = 1e-5);
        });
    }

    #[test]
    fn invalid_image_index_fails() {
        let images = Array3::zeros((1, 8, 8));
        let result = sampler(DroppedRegionPolicy::Exclude).sample(images.view(), &[rect([0, 0, 2, 2])], &[1]);
        assert!(result.is_err());
    }

    struct MeanClassifier;

    impl Classifier for MeanClassifier {
        fn num_classes(&self) -> usize {
            2
        }

        fn forward_t(&mut self, patches: ArrayView3<'_, f32>, _train: bool) -> Result<Array2<f32>> {
            let rows: Vec<f32> = patches
                .outer_iter()
                .flat_map(|patch| {
                    let mean = patch.mean().unwrap_or(0.0);
                    [mean, -mean]
                })
                .collect();
            Ok(Array2::from_shape_vec((patches.len_of(Axis(0)), 2), rows)?)
        }
    }

    #[test]
    fn chunked_classification_rejects_bad_input() {
        let mut classifier = MeanClassifier;
        let empty = Array3::<f32>::zeros((0, 4, 4));
        assert!(classify_chunked(&mut classifier, empty.view(), 8, false).is_err());
        let patches = Array3::<f32>::zeros((3, 4, 4));
        assert!(classify_chunked(&mut classifier, patches.view(), 0, false).is_err());
    }

    #[test]
    fn chunked_classification_keeps_order() {
        let mut classifier = MeanClassifier;
        let patches = Array3::from_shape_fn((5, 2, 2), |(index, _, _)| index as f32);
        let logits = classify_chunked(&mut classifier, patches.view(), 2, false).unwrap();
        assert_eq!(logits.dim(), (5, 2));
        let firsts: Vec<_> = logits.column(0).to_vec();
        assert_eq!(firsts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }
}
