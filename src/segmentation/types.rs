use ndarray::{Array2, Array3};
use std::fmt;
use thiserror::Error;

/// Floating point image, shape [height, width, channels], values in [0, 1]
pub type Image = Array3<f32>;

/// Full-image label buffer, 0 = background, anything else = class marker
pub type Mask = Array2<u8>;

/// Number of colour channels the core works with
pub const CHANNELS: usize = 3;

/// Histogram bins per channel
pub const BINS: usize = 256;

/// Pixel position as (row, column)
pub type Coord = (usize, usize);

/// The two seed classes
///
/// Object pixels are tied to the source terminal, background pixels to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassId {
    Background,
    Object,
}

impl ClassId {
    pub fn index(self) -> usize {
        match self {
            ClassId::Background => 0,
            ClassId::Object => 1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            ClassId::Background => ClassId::Object,
            ClassId::Object => ClassId::Background,
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassId::Background => write!(f, "background"),
            ClassId::Object => write!(f, "object"),
        }
    }
}

/// Rectangular region of interest in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// ROI covering a whole image of the given size
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|right| right <= width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= height)
    }

    /// Translate an image coordinate into ROI-local indices
    pub fn to_local(&self, (row, col): Coord) -> Option<Coord> {
        let local_row = row.checked_sub(self.y).filter(|&r| r < self.height)?;
        let local_col = col.checked_sub(self.x).filter(|&c| c < self.width)?;
        Some((local_row, local_col))
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Energy model selected per segmentation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EnergyModel {
    /// Intensity differences against the class mean colours
    #[default]
    Simple,
    /// Gaussian affinity with histogram likelihood terminals
    Probabilistic,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SegmentError {
    #[error("insufficient annotation: both object and background need at least one seed")]
    InsufficientAnnotation,

    #[error("no {class} seeds inside the region of interest")]
    EmptySeedIntersection { class: ClassId },

    #[error("channel value {value} outside the normalized range [0, 1]")]
    ChannelOutOfRange { value: f32 },

    #[error("coordinate (row {row}, column {col}) outside a {width}x{height} image")]
    CoordinateOutOfBounds {
        row: usize,
        col: usize,
        width: usize,
        height: usize,
    },

    #[error("region of interest {roi} does not fit a {width}x{height} image")]
    InvalidRoi {
        roi: Roi,
        width: usize,
        height: usize,
    },
}

pub type Result<T> = std::result::Result<T, SegmentError>;
