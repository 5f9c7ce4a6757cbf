//! Training program configuration format.

use crate::common::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub projection: ProjectionConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub training: TrainingConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }
}

/// Region extraction and patch sampling options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    /// The patch size in `[h, w]` order.
    #[serde(default = "default_patch_size")]
    pub patch_size: [usize; 2],
    #[serde(default = "default_min_area")]
    pub min_area: usize,
    #[serde(default = "default_min_side")]
    pub min_side: usize,
    #[serde(default)]
    pub dropped_region_policy: DroppedRegionPolicy,
}

impl ProjectionConfig {
    pub fn filter(&self) -> RegionFilter {
        RegionFilter {
            min_area: self.min_area,
            min_side: self.min_side,
        }
    }

    pub fn build_projector(&self) -> Result<BatchProjector> {
        ProjectorInit {
            patch_size: HW::try_from_hw(self.patch_size)?,
            filter: self.filter(),
            policy: self.dropped_region_policy,
        }
        .build()
    }
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            patch_size: default_patch_size(),
            min_area: default_min_area(),
            min_side: default_min_side(),
            dropped_region_policy: Default::default(),
        }
    }
}

/// Detection metric options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_ap_iou_threshold")]
    pub ap_iou_threshold: R64,
    #[serde(default)]
    pub integral_method: IntegralMethod,
}

impl MetricsConfig {
    pub fn build_calculator(&self) -> Result<MeanApCalculator> {
        MeanApCalculator::new(self.integral_method, self.ap_iou_threshold.raw())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            ap_iou_threshold: default_ap_iou_threshold(),
            integral_method: Default::default(),
        }
    }
}

/// The training options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: BatchSizeConfig,
    /// The maximum number of patches per classifier call in evaluation passes.
    #[serde(default = "default_chunk_size")]
    pub classifier_chunk_size: NonZeroUsize,
}

/// Batch sizes per pass kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSizeConfig {
    pub train: NonZeroUsize,
    pub val: NonZeroUsize,
    pub test: NonZeroUsize,
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    #[serde(default)]
    pub enable_images: bool,
}

fn default_patch_size() -> [usize; 2] {
    [64, 64]
}

fn default_min_area() -> usize {
    RegionFilter::default().min_area
}

fn default_min_side() -> usize {
    RegionFilter::default().min_side
}

fn default_ap_iou_threshold() -> R64 {
    r64(0.5)
}

const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(32) {
    Some(size) => size,
    None => unreachable!(),
};

fn default_chunk_size() -> NonZeroUsize {
    DEFAULT_CHUNK_SIZE
}
