use super::ImageSource;
use crate::segmentation::Image;
use crate::segmentation::types::CHANNELS;
use anyhow::{Context, Result};
use image::{imageops, DynamicImage};
use std::path::{Path, PathBuf};

/// Image file decoded with the `image` crate
pub struct FileImage {
    path: PathBuf,
    resize: Option<(u32, u32)>,
    grayscale: bool,
}

impl FileImage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            resize: None,
            grayscale: false,
        }
    }

    /// Resize to exactly `width` x `height` at load time
    pub fn with_resize(mut self, size: Option<(u32, u32)>) -> Self {
        self.resize = size;
        self
    }

    /// Load as luminance replicated to three channels
    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }
}

impl ImageSource for FileImage {
    fn read_image(&self) -> Result<Image> {
        let _span = tracing::debug_span!("load_image").entered();

        tracing::info!("Loading image from {}", self.path.display());
        let mut image = image::open(&self.path)
            .with_context(|| format!("Failed to load image from {}", self.path.display()))?;

        if let Some((width, height)) = self.resize {
            if (image.width(), image.height()) != (width, height) {
                tracing::debug!("Resizing to {}x{}", width, height);
                image = image.resize_exact(width, height, imageops::FilterType::Lanczos3);
            }
        }

        if self.grayscale {
            image = image.grayscale();
        }

        let tensor = to_tensor(&image);
        let (height, width, _) = tensor.dim();
        tracing::info!("Image loaded: {}x{}", width, height);

        Ok(tensor)
    }
}

/// Convert to an HWC float tensor normalised to [0, 1]
///
/// Single-channel sources are replicated to three channels.
pub fn to_tensor(image: &DynamicImage) -> Image {
    let rgb = image.to_rgb32f();
    let (width, height) = rgb.dimensions();
    let mut tensor = Image::zeros((height as usize, width as usize, CHANNELS));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..CHANNELS {
            tensor[[y as usize, x as usize, c]] = pixel[c].clamp(0.0, 1.0);
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn rgb_values_are_normalised() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, Rgb([0, 128, 255]));
        rgb.put_pixel(1, 0, Rgb([255, 255, 255]));

        let tensor = to_tensor(&DynamicImage::ImageRgb8(rgb));

        assert_eq!(tensor.dim(), (1, 2, 3));
        assert_eq!(tensor[[0, 0, 0]], 0.0);
        assert!((tensor[[0, 0, 1]] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 2]], 1.0);
        assert_eq!(tensor[[0, 1, 1]], 1.0);
    }

    #[test]
    fn grayscale_is_replicated() {
        let gray = GrayImage::from_pixel(3, 2, Luma([51]));
        let tensor = to_tensor(&DynamicImage::ImageLuma8(gray));

        assert_eq!(tensor.dim(), (2, 3, 3));
        for c in 0..3 {
            assert!((tensor[[1, 2, c]] - 0.2).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FileImage::new("/nonexistent/input.png").read_image().unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/input.png"));
    }
}
