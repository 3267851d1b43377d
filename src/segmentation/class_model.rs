use super::types::{ClassId, Coord, Result, Roi, SegmentError, BINS, CHANNELS};
use ndarray::{Array2, ArrayView3, Axis};
use std::collections::HashSet;

/// Raw per-channel bin counts for one class
pub type Histogram = Array2<u64>;

/// Per-channel probabilities, each row sums to 1 (or is all zero)
pub type NormalizedHistogram = Array2<f64>;

/// Seed statistics gathered from annotation events
///
/// Raw counts are only ever incremented by `record` and zeroed by `reset`;
/// normalisation always produces a fresh copy.
#[derive(Debug, Clone)]
pub struct ClassModel {
    histograms: [Histogram; 2],
    seeds: [HashSet<Coord>; 2],
}

impl Default for ClassModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassModel {
    pub fn new() -> Self {
        Self {
            histograms: [
                Histogram::zeros((CHANNELS, BINS)),
                Histogram::zeros((CHANNELS, BINS)),
            ],
            seeds: [HashSet::new(), HashSet::new()],
        }
    }

    /// Add one annotated pixel with already quantised channel values
    ///
    /// Coordinates are image (row, column). Re-recording a coordinate keeps the
    /// seed set unchanged but still counts the colour again. A coordinate is a
    /// seed of one class at a time: the latest annotation moves it out of the
    /// other class, whose histogram keeps its earlier count.
    pub fn record(&mut self, class: ClassId, coord: Coord, channels: [u8; CHANNELS]) {
        let idx = class.index();
        self.seeds[class.opposite().index()].remove(&coord);
        self.seeds[idx].insert(coord);
        for (c, value) in channels.into_iter().enumerate() {
            self.histograms[idx][[c, value as usize]] += 1;
        }
    }

    /// Add one annotated pixel with channel values in [0, 1]
    pub fn record_normalized(
        &mut self,
        class: ClassId,
        coord: Coord,
        channels: [f32; CHANNELS],
    ) -> Result<()> {
        let mut quantized = [0u8; CHANNELS];
        for (slot, value) in quantized.iter_mut().zip(channels) {
            *slot = quantize(value)?;
        }
        self.record(class, coord, quantized);
        Ok(())
    }

    pub fn reset(&mut self) {
        for hist in self.histograms.iter_mut() {
            hist.fill(0);
        }
        for seeds in self.seeds.iter_mut() {
            seeds.clear();
        }
        tracing::debug!("Class model reset");
    }

    /// Both classes have at least one counted pixel
    pub fn is_ready(&self) -> bool {
        self.histograms.iter().all(|h| h.iter().any(|&n| n > 0))
    }

    pub fn is_seed(&self, class: ClassId, coord: Coord) -> bool {
        self.seeds[class.index()].contains(&coord)
    }

    pub fn seed_count(&self, class: ClassId) -> usize {
        self.seeds[class.index()].len()
    }

    pub fn seeds(&self, class: ClassId) -> impl Iterator<Item = Coord> + '_ {
        self.seeds[class.index()].iter().copied()
    }

    #[cfg(test)]
    pub fn histogram(&self, class: ClassId) -> &Histogram {
        &self.histograms[class.index()]
    }

    /// Copy of the model for a single segmentation call
    pub fn snapshot(&self) -> ClassModel {
        self.clone()
    }

    /// Mean colour of the class seeds that fall inside `roi`
    ///
    /// `pixels` is the ROI sub-image, indexed with ROI-local coordinates.
    pub fn mean_color(
        &self,
        class: ClassId,
        roi: Roi,
        pixels: ArrayView3<f32>,
    ) -> Result<[f32; CHANNELS]> {
        let mut sum = [0.0f64; CHANNELS];
        let mut count = 0usize;

        for local in self.seeds(class).filter_map(|coord| roi.to_local(coord)) {
            let pixel = pixels.slice(ndarray::s![local.0, local.1, ..]);
            for (acc, &value) in sum.iter_mut().zip(pixel.iter()) {
                *acc += value as f64;
            }
            count += 1;
        }

        if count == 0 {
            return Err(SegmentError::EmptySeedIntersection { class });
        }

        let mut mean = [0.0f32; CHANNELS];
        for (out, acc) in mean.iter_mut().zip(sum) {
            *out = (acc / count as f64) as f32;
        }
        Ok(mean)
    }

    /// Per-channel histogram divided by its own sum
    pub fn normalized_histogram(&self, class: ClassId) -> NormalizedHistogram {
        let mut normalized = self.histograms[class.index()].mapv(|n| n as f64);
        for mut row in normalized.axis_iter_mut(Axis(0)) {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            }
        }
        normalized
    }
}

/// Histogram bin for a channel value in [0, 1]
pub fn quantize(value: f32) -> Result<u8> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SegmentError::ChannelOutOfRange { value });
    }
    Ok((value * 255.0).round() as u8)
}
