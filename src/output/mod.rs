mod mask_file;

pub use mask_file::MaskFile;

use crate::segmentation::Mask;
use anyhow::Result;

/// Trait for destinations of segmentation masks
pub trait OutputSink {
    /// Persist a single-channel label mask
    fn write_mask(&mut self, mask: &Mask) -> Result<()>;
}
