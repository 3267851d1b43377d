mod class_model;
mod features;
mod graph;
mod segmenter;
mod weights;
pub mod types;

pub use graph::Progress;
pub use segmenter::{SegmentRequest, Segmenter};
pub use types::{ClassId, EnergyModel, Image, Mask, Roi};
