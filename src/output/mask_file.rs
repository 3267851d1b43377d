use super::OutputSink;
use crate::segmentation::Mask;
use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};

/// Writes masks as grayscale images, format chosen from the file extension
pub struct MaskFile {
    path: PathBuf,
}

impl MaskFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Convert a label mask to an 8-bit grayscale image
pub fn mask_to_gray(mask: &Mask) -> GrayImage {
    let (height, width) = mask.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        Luma([mask[[y as usize, x as usize]]])
    })
}

impl OutputSink for MaskFile {
    fn write_mask(&mut self, mask: &Mask) -> Result<()> {
        let gray = mask_to_gray(mask);
        gray.save(&self.path)
            .with_context(|| format!("Failed to write mask to {}", self.path.display()))?;

        tracing::info!(
            "Mask written to {} ({}x{})",
            self.path.display(),
            gray.width(),
            gray.height()
        );
        Ok(())
    }
}
