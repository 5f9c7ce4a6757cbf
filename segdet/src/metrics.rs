//! Segmentation, classification and detection metrics.

mod accuracy;
mod average_precision;
mod iou;
mod loss;

pub use accuracy::*;
pub use average_precision::*;
pub use iou::*;
pub use loss::*;
