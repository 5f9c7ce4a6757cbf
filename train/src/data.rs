//! Datasets and batching.

use crate::common::*;
use std::fmt::Debug;

/// One grayscale image with its ground truth.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Intensities in `[0, 1]`.
    pub image: Array2<f32>,
    /// The ground truth foreground mask with values in `{0, 1}`.
    pub mask: Array2<f32>,
    pub class_mask: ClassMask,
}

impl Sample {
    /// Builds a sample whose foreground mask is the non-background part of
    /// the class mask.
    pub fn from_class_mask(image: Array2<f32>, class_mask: ClassMask) -> Result<Self> {
        ensure!(
            image.dim() == class_mask.dim(),
            "image and class mask shapes mismatch: {:?} vs {:?}",
            image.dim(),
            class_mask.dim()
        );
        let mask = class_mask
            .labels()
            .mapv(|label| if label.is_some() { 1.0 } else { 0.0 });
        Ok(Self {
            image,
            mask,
            class_mask,
        })
    }
}

/// The dataset that can be random accessed.
pub trait BatchSource
where
    Self: Debug,
{
    /// Get number of samples in the dataset.
    fn num_samples(&self) -> usize;

    /// Get the nth sample in the dataset.
    fn sample(&self, index: usize) -> Result<Sample>;
}

impl<T> BatchSource for Box<T>
where
    T: BatchSource + ?Sized,
{
    fn num_samples(&self) -> usize {
        (**self).num_samples()
    }

    fn sample(&self, index: usize) -> Result<Sample> {
        (**self).sample(index)
    }
}

/// Iterates over consecutive batches in dataset order. The last batch may be
/// smaller.
pub fn batches<S>(source: &S, batch_size: NonZeroUsize) -> impl Iterator<Item = Result<Batch>> + '_
where
    S: BatchSource + ?Sized,
{
    let num_samples = source.num_samples();
    let batch_size = batch_size.get();

    (0..num_samples).step_by(batch_size).map(move |start| {
        let end = (start + batch_size).min(num_samples);
        let samples: Vec<Sample> = (start..end).map(|index| source.sample(index)).try_collect()?;
        stack_samples(samples)
    })
}

fn stack_samples(samples: Vec<Sample>) -> Result<Batch> {
    ensure!(!samples.is_empty(), "cannot stack an empty list of samples");

    let images = {
        let views: Vec<_> = samples.iter().map(|sample| sample.image.view()).collect();
        ndarray::stack(Axis(0), &views).context("images in a batch must have equal sizes")?
    };
    let masks = {
        let views: Vec<_> = samples.iter().map(|sample| sample.mask.view()).collect();
        ndarray::stack(Axis(0), &views).context("masks in a batch must have equal sizes")?
    };
    let class_masks = samples.into_iter().map(|sample| sample.class_mask).collect();

    Batch::new(images, masks, class_masks)
}

/// A dataset held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    samples: Vec<Sample>,
}

impl InMemorySource {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl BatchSource for InMemorySource {
    fn num_samples(&self) -> usize {
        self.samples.len()
    }

    fn sample(&self, index: usize) -> Result<Sample> {
        self.samples
            .get(index)
            .cloned()
            .ok_or_else(|| format_err!("sample index {} out of range", index))
    }
}

/// A directory of PNG files.
///
/// The layout is `images/`, `class_masks/` and an optional `predicted/`
/// directory, each holding files of equal names. Class mask value 0 is
/// background and value `v > 0` is class `v - 1`. Predicted mask pixels above
/// 127 are foreground.
#[derive(Debug, Clone)]
pub struct MaskDirectory {
    dir: PathBuf,
    file_names: Vec<String>,
}

impl MaskDirectory {
    pub const IMAGE_DIR: &'static str = "images";
    pub const CLASS_MASK_DIR: &'static str = "class_masks";
    pub const PREDICTED_DIR: &'static str = "predicted";

    pub fn open<P>(dir: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let dir = dir.as_ref().to_owned();
        let image_dir = dir.join(Self::IMAGE_DIR);
        ensure!(
            image_dir.is_dir(),
            "'{}' is not a directory",
            image_dir.display()
        );

        let paths: Vec<PathBuf> = glob::glob(&format!("{}/*.png", image_dir.display()))?.try_collect()?;
        let file_names: Vec<String> = paths
            .iter()
            .map(|path| -> Result<_> {
                let file_name = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .ok_or_else(|| format_err!("invalid file name '{}'", path.display()))?;
                Ok(file_name.to_string())
            })
            .try_collect()?;
        let file_names: Vec<_> = file_names.into_iter().sorted().collect();

        for file_name in &file_names {
            let class_mask_file = dir.join(Self::CLASS_MASK_DIR).join(file_name);
            ensure!(
                class_mask_file.is_file(),
                "class mask file '{}' is missing",
                class_mask_file.display()
            );
        }

        info!("found {} samples in '{}'", file_names.len(), dir.display());

        Ok(Self { dir, file_names })
    }

    pub fn file_names(&self) -> &[String] {
        &self.file_names
    }

    fn file_path(&self, kind: &str, index: usize) -> Result<PathBuf> {
        let file_name = self
            .file_names
            .get(index)
            .ok_or_else(|| format_err!("sample index {} out of range", index))?;
        Ok(self.dir.join(kind).join(file_name))
    }

    /// Loads the precomputed segmentation of the nth sample.
    pub fn predicted_mask(&self, index: usize) -> Result<Array2<bool>> {
        let path = self.file_path(Self::PREDICTED_DIR, index)?;
        let raw = load_luma(&path)?;
        Ok(raw.mapv(|value| value > 127))
    }
}

impl BatchSource for MaskDirectory {
    fn num_samples(&self) -> usize {
        self.file_names.len()
    }

    fn sample(&self, index: usize) -> Result<Sample> {
        let image_path = self.file_path(Self::IMAGE_DIR, index)?;
        let image = load_luma(&image_path)?.mapv(|value| value as f32 / 255.0);

        let class_mask_path = self.file_path(Self::CLASS_MASK_DIR, index)?;
        let raw = load_luma(&class_mask_path)?.mapv(|value| value as i64 - 1);
        let class_mask = ClassMask::from_raw(raw.view(), -1)
            .with_context(|| format!("invalid class mask '{}'", class_mask_path.display()))?;

        Sample::from_class_mask(image, class_mask)
            .with_context(|| format!("invalid sample '{}'", self.file_names[index]))
    }
}

/// Loads an image as 8-bit grayscale in `[H, W]` layout.
fn load_luma(path: &Path) -> Result<Array2<u8>> {
    let image = image::open(path)
        .with_context(|| format!("failed to open image '{}'", path.display()))?
        .to_luma8();
    let (width, height) = image.dimensions();
    let array = Array2::from_shape_vec((height as usize, width as usize), image.into_raw())?;
    Ok(array)
}
