//! Interfaces of the segmentation network and the patch classifier.

use crate::common::*;

/// A pixel-wise segmentation network.
pub trait Segmenter {
    /// Computes mask logits in `[B, H, W]` layout for images in `[B, H, W]` layout.
    fn forward_t(&mut self, images: ArrayView3<'_, f32>, train: bool) -> Result<Array3<f32>>;
}

/// A classifier over fixed-size image patches.
pub trait Classifier {
    fn num_classes(&self) -> usize;

    /// Computes class logits in `[N, C]` layout for patches in `[N, ph, pw]` layout.
    fn forward_t(&mut self, patches: ArrayView3<'_, f32>, train: bool) -> Result<Array2<f32>>;
}

/// Persists network weights.
pub trait SaveWeights {
    fn save(&self, path: &Path) -> Result<()>;
}

impl<T> Segmenter for Box<T>
where
    T: Segmenter + ?Sized,
{
    fn forward_t(&mut self, images: ArrayView3<'_, f32>, train: bool) -> Result<Array3<f32>> {
        (**self).forward_t(images, train)
    }
}

impl<T> Classifier for Box<T>
where
    T: Classifier + ?Sized,
{
    fn num_classes(&self) -> usize {
        (**self).num_classes()
    }

    fn forward_t(&mut self, patches: ArrayView3<'_, f32>, train: bool) -> Result<Array2<f32>> {
        (**self).forward_t(patches, train)
    }
}
