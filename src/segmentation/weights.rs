use super::class_model::{quantize, ClassModel, NormalizedHistogram};
use super::features::{texture_distance, TextureTensor};
use super::types::{ClassId, EnergyModel, Result, Roi, CHANNELS};
use ndarray::{ArrayView1, ArrayView3};

/// Fixed sigma of the Gaussian boundary affinity
const SIGMA: f64 = 1.0;

/// Energy terms prepared for one segmentation call
///
/// Built from a class model snapshot; evaluating weights never mutates it.
#[derive(Debug, Clone)]
pub enum WeightModel {
    Intensity {
        /// Intensity range (max - min) of the ROI
        range: f64,
        /// Maximum intensity of the ROI
        max: f64,
        object_mean: [f32; CHANNELS],
        background_mean: [f32; CHANNELS],
    },
    Probabilistic {
        object_hist: NormalizedHistogram,
        background_hist: NormalizedHistogram,
    },
}

impl WeightModel {
    /// Derive the class statistics the chosen model needs for `pixels`
    ///
    /// Fails before any graph work when a class mean is undefined for the ROI.
    pub fn prepare(
        kind: EnergyModel,
        classes: &ClassModel,
        roi: Roi,
        pixels: ArrayView3<f32>,
    ) -> Result<Self> {
        let _span = tracing::debug_span!("weights").entered();

        match kind {
            EnergyModel::Simple => {
                let (min, max) = pixels
                    .iter()
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    });
                let object_mean = classes.mean_color(ClassId::Object, roi, pixels)?;
                let background_mean = classes.mean_color(ClassId::Background, roi, pixels)?;

                tracing::debug!(
                    "Intensity model: range={:.3}, max={:.3}, object={:?}, background={:?}",
                    max - min,
                    max,
                    object_mean,
                    background_mean
                );

                Ok(WeightModel::Intensity {
                    range: (max - min) as f64,
                    max: max as f64,
                    object_mean,
                    background_mean,
                })
            }
            EnergyModel::Probabilistic => Ok(WeightModel::Probabilistic {
                object_hist: classes.normalized_histogram(ClassId::Object),
                background_hist: classes.normalized_histogram(ClassId::Background),
            }),
        }
    }

    /// Boundary weight between two adjacent pixels, symmetric in its arguments
    pub fn pairwise(&self, p: ArrayView1<f32>, q: ArrayView1<f32>) -> f64 {
        let diff = max_abs_diff(p.iter().copied(), q.iter().copied());
        match self {
            WeightModel::Intensity { range, .. } => range - diff,
            WeightModel::Probabilistic { .. } => (-(diff * diff) / (2.0 * SIGMA * SIGMA)).exp(),
        }
    }

    /// Capacity of the link tying `pixel` to the terminal of `class`
    ///
    /// Cutting this link assigns the pixel to the other class, so the value is
    /// the cost of that assignment. Histogram likelihoods of exactly zero give
    /// `f64::INFINITY`.
    pub fn terminal(&self, pixel: ArrayView1<f32>, class: ClassId) -> f64 {
        match self {
            WeightModel::Intensity {
                max,
                object_mean,
                background_mean,
                ..
            } => {
                let mean = match class {
                    ClassId::Object => object_mean,
                    ClassId::Background => background_mean,
                };
                max - max_abs_diff(mean.iter().copied(), pixel.iter().copied())
            }
            WeightModel::Probabilistic {
                object_hist,
                background_hist,
            } => {
                let hist = match class.opposite() {
                    ClassId::Object => object_hist,
                    ClassId::Background => background_hist,
                };
                likelihood_cost(hist, pixel)
            }
        }
    }
}

/// -ln of the summed per-channel probability, clamped at 0
fn likelihood_cost(hist: &NormalizedHistogram, pixel: ArrayView1<f32>) -> f64 {
    let mut probability = 0.0f64;
    for (c, &value) in pixel.iter().enumerate().take(CHANNELS) {
        // values outside [0, 1] never appear in a histogram
        if let Ok(bin) = quantize(value) {
            probability += hist[[c, bin as usize]];
        }
    }

    if probability == 0.0 {
        f64::INFINITY
    } else {
        (-probability.ln()).max(0.0)
    }
}

fn max_abs_diff(a: impl Iterator<Item = f32>, b: impl Iterator<Item = f32>) -> f64 {
    a.zip(b)
        .map(|(x, y)| (x as f64 - y as f64).abs())
        .fold(0.0, f64::max)
}

/// Weight model bound to the ROI pixels and optional texture descriptors
pub struct EdgeWeights<'a> {
    pub model: &'a WeightModel,
    pub pixels: ArrayView3<'a, f32>,
    pub texture: Option<&'a TextureTensor>,
}

impl<'a> EdgeWeights<'a> {
    pub fn new(
        model: &'a WeightModel,
        pixels: ArrayView3<'a, f32>,
        texture: Option<&'a TextureTensor>,
    ) -> Self {
        Self {
            model,
            pixels,
            texture,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        let (height, width, _) = self.pixels.dim();
        (height, width)
    }

    /// Boundary weight between ROI-local pixels, reduced by texture dissimilarity
    pub fn pairwise(&self, p: (usize, usize), q: (usize, usize)) -> f64 {
        let weight = self.model.pairwise(self.pixel(p), self.pixel(q));
        match self.texture {
            Some(texture) => weight - texture_distance(texture, p, q) as f64,
            None => weight,
        }
    }

    /// (source, sink) capacities for an unseeded ROI-local pixel
    pub fn terminals(&self, p: (usize, usize)) -> (f64, f64) {
        let pixel = self.pixel(p);
        (
            self.model.terminal(pixel.view(), ClassId::Object),
            self.model.terminal(pixel, ClassId::Background),
        )
    }

    fn pixel(&self, (row, col): (usize, usize)) -> ArrayView1<'_, f32> {
        self.pixels.slice(ndarray::s![row, col, ..])
    }
}
