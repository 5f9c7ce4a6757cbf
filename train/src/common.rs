//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use bbox::{prelude::*, HW};
pub use chrono::Local;
pub use image::{Rgb, RgbImage};
pub use indexmap::IndexMap;
pub use itertools::{izip, Itertools};
pub use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, Axis};
pub use noisy_float::prelude::*;
pub use segdet::{
    binarize_logits, classify_chunked, create_boxes,
    metrics::{self, IntegralMethod, MeanApCalculator, Reduce},
    Batch, BatchProjector, BoundingBoxes, ClassId, ClassMask, Classifier, Collector,
    DroppedRegionPolicy, Projection, ProjectorInit, Rectangle, RegionFilter, SaveWeights,
    Segmenter, TrueClass,
};
pub use serde::{Deserialize, Serialize};
pub use std::{
    fmt,
    fs::{self, File},
    io::{BufWriter, Write as _},
    iter,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, Instant},
};
pub use tracing::{debug, info, warn};
