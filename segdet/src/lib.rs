//! Projection of dense segmentation masks into classified region proposals,
//! and the detection metrics computed over them.

mod common;
pub mod batch;
pub mod boxes;
pub mod collector;
pub mod matching;
pub mod metrics;
pub mod network;
pub mod patch;
pub mod projection;
pub mod region;
pub mod utils;

pub use batch::*;
pub use boxes::*;
pub use collector::*;
pub use matching::*;
pub use network::*;
pub use patch::*;
pub use projection::*;
pub use region::*;

pub use label::{ClassId, TrueClass};
