//! Batched images, masks and ground truth class masks.

use crate::{common::*, utils};

/// Per-pixel ground truth categories of one image. `None` marks background.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassMask {
    labels: Array2<Option<ClassId>>,
}

impl ClassMask {
    pub fn new(labels: Array2<Option<ClassId>>) -> Self {
        Self { labels }
    }

    /// A mask without any ground truth.
    pub fn background(height: usize, width: usize) -> Self {
        Self {
            labels: Array2::from_elem((height, width), None),
        }
    }

    /// Builds a class mask from raw integer labels.
    ///
    /// Pixels equal to `background` carry no category. Every other value must
    /// be a non-negative class id.
    pub fn from_raw(raw: ArrayView2<'_, i64>, background: i64) -> Result<Self> {
        let values: Vec<Option<ClassId>> = raw
            .iter()
            .map(|&value| -> Result<_> {
                if value == background {
                    return Ok(None);
                }
                ensure!(value >= 0, "invalid class id {} in class mask", value);
                Ok(Some(ClassId(value as usize)))
            })
            .try_collect()?;
        let labels = Array2::from_shape_vec(raw.dim(), values)?;
        Ok(Self { labels })
    }

    pub fn labels(&self) -> ArrayView2<'_, Option<ClassId>> {
        self.labels.view()
    }

    /// Returns `(height, width)`.
    pub fn dim(&self) -> (usize, usize) {
        self.labels.dim()
    }

    /// Classes present in the mask, in increasing order.
    pub fn classes(&self) -> Vec<ClassId> {
        self.labels.iter().flatten().copied().unique().sorted().collect()
    }
}

/// One batch as produced by the data loader.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Grayscale images in `[B, H, W]` layout with intensities in `[0, 1]`.
    pub images: Array3<f32>,
    /// Ground truth foreground masks in `[B, H, W]` layout.
    pub masks: Array3<f32>,
    pub class_masks: Vec<ClassMask>,
}

impl Batch {
    pub fn new(images: Array3<f32>, masks: Array3<f32>, class_masks: Vec<ClassMask>) -> Result<Self> {
        ensure!(
            images.dim() == masks.dim(),
            "images and masks shapes mismatch: {:?} vs {:?}",
            images.dim(),
            masks.dim()
        );
        check_class_masks(images.view(), &class_masks)?;

        Ok(Self {
            images,
            masks,
            class_masks,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.images.len_of(Axis(0))
    }

    /// Returns `(height, width)` shared by every image in the batch.
    pub fn image_dim(&self) -> (usize, usize) {
        let (_b, h, w) = self.images.dim();
        (h, w)
    }
}

/// Verifies that there is one class mask per image and that sizes agree.
pub(crate) fn check_class_masks(images: ArrayView3<'_, f32>, class_masks: &[ClassMask]) -> Result<()> {
    let (batch_size, height, width) = images.dim();
    ensure!(
        class_masks.len() == batch_size,
        "expect {} class masks, but get {}",
        batch_size,
        class_masks.len()
    );
    for (index, class_mask) in class_masks.iter().enumerate() {
        ensure!(
            class_mask.dim() == (height, width),
            "class mask {} has shape {:?}, but images are {}x{}",
            index,
            class_mask.dim(),
            height,
            width
        );
    }
    Ok(())
}

/// Binarizes mask logits with `sigmoid(x) > 0.5`.
pub fn binarize_logits(logits: ArrayView3<'_, f32>) -> Array3<bool> {
    logits.mapv(|logit| utils::sigmoid(logit) > 0.5)
}

/// Binarizes probabilities or ground truth masks with `x > 0.5`.
pub fn binarize_probs(probs: ArrayView3<'_, f32>) -> Array3<bool> {
    probs.mapv(|prob| prob > 0.5)
}
