//! Training and evaluation programs of the segmentation-to-detection pipeline.

pub mod checkpoint;
pub mod common;
pub mod config;
pub mod data;
pub mod evaluate;
pub mod logging;
pub mod trainer;
pub mod utils;
pub mod visualize;
