use super::{Annotation, AnnotationSource};
use crate::segmentation::ClassId;
use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Channel level a stroke colour must reach
const STROKE_MIN: u8 = 128;
/// Level the other channels must stay below
const STROKE_MAX_OTHER: u8 = 100;

/// Seed strokes painted on an image: blue marks the object, red the background
pub struct ScribbleImage {
    path: PathBuf,
}

impl ScribbleImage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl AnnotationSource for ScribbleImage {
    fn annotations(&self, width: u32, height: u32) -> Result<Vec<Annotation>> {
        let scribbles = image::open(&self.path)
            .with_context(|| format!("Failed to load scribbles from {}", self.path.display()))?
            .to_rgb8();

        // Nearest keeps stroke colours pure
        let scribbles = if scribbles.dimensions() != (width, height) {
            tracing::debug!(
                "Resizing scribbles from {:?} to {}x{}",
                scribbles.dimensions(),
                width,
                height
            );
            imageops::resize(&scribbles, width, height, imageops::FilterType::Nearest)
        } else {
            scribbles
        };

        let annotations = extract_annotations(&scribbles);
        tracing::info!(
            "Read {} annotated points from {}",
            annotations.len(),
            self.path.display()
        );
        Ok(annotations)
    }
}

/// Annotated points of a scribble image in row-major order
pub fn extract_annotations(scribbles: &RgbImage) -> Vec<Annotation> {
    let mut annotations = Vec::new();
    for y in 0..scribbles.height() {
        for x in 0..scribbles.width() {
            if let Some(class) = classify_stroke(scribbles.get_pixel(x, y)) {
                annotations.push(Annotation {
                    class,
                    x: x as usize,
                    y: y as usize,
                });
            }
        }
    }
    annotations
}

fn classify_stroke(&Rgb([r, g, b]): &Rgb<u8>) -> Option<ClassId> {
    if b >= STROKE_MIN && r < STROKE_MAX_OTHER && g < STROKE_MAX_OTHER {
        Some(ClassId::Object)
    } else if r >= STROKE_MIN && g < STROKE_MAX_OTHER && b < STROKE_MAX_OTHER {
        Some(ClassId::Background)
    } else {
        None
    }
}
