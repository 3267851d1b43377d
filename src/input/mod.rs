mod file_image;
mod scribbles;

pub use file_image::FileImage;
pub use scribbles::ScribbleImage;

use crate::segmentation::{ClassId, Image};
use anyhow::Result;

/// A single annotated point, in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Annotation {
    pub class: ClassId,
    pub x: usize,
    pub y: usize,
}

/// Trait for image sources feeding the segmenter
pub trait ImageSource {
    /// Decode the image into a float tensor with values in [0, 1]
    fn read_image(&self) -> Result<Image>;
}

/// Trait for annotation sources (seed strokes)
pub trait AnnotationSource {
    /// All annotated points for an image of the given size
    fn annotations(&self, width: u32, height: u32) -> Result<Vec<Annotation>>;
}
