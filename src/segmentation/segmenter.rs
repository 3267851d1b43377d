use super::class_model::ClassModel;
use super::features::texture_features;
use super::graph::{build_graph, GraphStats, Progress};
use super::types::{
    ClassId, Coord, EnergyModel, Image, Mask, Result, Roi, SegmentError, CHANNELS,
};
use super::weights::{EdgeWeights, WeightModel};
use crate::solver::{MinCutSolver, PetgraphSolver, Segment};
use ndarray::{s, Array2};
use std::marker::PhantomData;

/// Where a segmenter is in its request cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Annotated,
    Building,
    Solving,
    Composited,
}

/// Parameters of a single segmentation call
#[derive(Debug, Clone, Copy)]
pub struct SegmentRequest {
    /// Region to segment, the whole image when `None`
    pub roi: Option<Roi>,
    pub model: EnergyModel,
    /// Subtract texture dissimilarity from boundary weights
    pub use_texture: bool,
    /// Label painted for object pixels
    pub class_marker: u8,
}

impl Default for SegmentRequest {
    fn default() -> Self {
        Self {
            roi: None,
            model: EnergyModel::Simple,
            use_texture: true,
            class_marker: 255,
        }
    }
}

/// Outcome of a completed call
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub roi: Roi,
    pub flow: f64,
    pub object_pixels: usize,
    pub stats: GraphStats,
    /// Persistent mask cropped to the ROI after compositing
    pub mask: Mask,
}

/// Interactive graph-cut segmentation session
///
/// Owns the image, the annotation state and the persistent mask. A fresh
/// solver problem of type `S` is created for every call. Cancellation is not
/// supported once a call has started.
pub struct Segmenter<S: MinCutSolver + Default = PetgraphSolver> {
    image: Image,
    classes: ClassModel,
    mask: Mask,
    last_roi: Option<Roi>,
    phase: Phase,
    _solver: PhantomData<S>,
}

impl<S: MinCutSolver + Default> Segmenter<S> {
    pub fn new(image: Image) -> Self {
        let (height, width, _) = image.dim();
        Self {
            image,
            classes: ClassModel::new(),
            mask: Array2::zeros((height, width)),
            last_roi: None,
            phase: Phase::Idle,
            _solver: PhantomData,
        }
    }

    /// (width, height) of the session image
    pub fn dimensions(&self) -> (usize, usize) {
        let (height, width, _) = self.image.dim();
        (width, height)
    }

    pub fn classes(&self) -> &ClassModel {
        &self.classes
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Record an annotation event at `coord` using the session image's own colour
    pub fn record_pixel(&mut self, class: ClassId, coord: Coord) -> Result<()> {
        let (row, col) = coord;
        let (width, height) = self.dimensions();
        if row >= height || col >= width {
            return Err(SegmentError::CoordinateOutOfBounds {
                row,
                col,
                width,
                height,
            });
        }

        let mut channels = [0.0f32; CHANNELS];
        for (c, slot) in channels.iter_mut().enumerate() {
            *slot = self.image[[row, col, c]];
        }
        self.classes.record_normalized(class, coord, channels)
    }

    /// Forget all seeds and histograms; the persistent mask is kept
    pub fn reset(&mut self) {
        self.classes.reset();
    }

    /// Copy of the persistent mask inside `roi`
    pub fn roi_mask(&self, roi: Roi) -> Mask {
        self.mask
            .slice(s![roi.y..roi.y + roi.height, roi.x..roi.x + roi.width])
            .to_owned()
    }

    /// Run one segmentation and composite it into the persistent mask
    ///
    /// Failed preconditions are reported without touching the mask. The
    /// segmenter is back in `Phase::Idle` when this returns.
    pub fn segment(
        &mut self,
        request: &SegmentRequest,
        progress: Option<Progress<'_>>,
    ) -> Result<Segmentation> {
        let (width, height) = self.dimensions();
        let roi = request.roi.unwrap_or_else(|| Roi::full(width, height));

        let result = self.run(request, roi, progress);
        match &result {
            Ok(done) => tracing::info!(
                "Segmented {} with {:?} model: flow={:.3}, object pixels={}",
                roi,
                request.model,
                done.flow,
                done.object_pixels
            ),
            Err(err) => tracing::warn!("Segmentation of {} aborted: {}", roi, err),
        }

        advance(&mut self.phase, Phase::Idle);
        result
    }

    fn run(
        &mut self,
        request: &SegmentRequest,
        roi: Roi,
        progress: Option<Progress<'_>>,
    ) -> Result<Segmentation> {
        let (width, height) = self.dimensions();
        if !roi.fits_within(width, height) {
            return Err(SegmentError::InvalidRoi { roi, width, height });
        }
        if !self.classes.is_ready() {
            return Err(SegmentError::InsufficientAnnotation);
        }
        advance(&mut self.phase, Phase::Annotated);

        let pixels = self
            .image
            .slice(s![roi.y..roi.y + roi.height, roi.x..roi.x + roi.width, ..]);

        // Everything that can fail happens before the first node is emitted.
        let classes = self.classes.snapshot();
        let model = WeightModel::prepare(request.model, &classes, roi, pixels)?;
        advance(&mut self.phase, Phase::Building);

        let texture = request.use_texture.then(|| texture_features(pixels));
        let weights = EdgeWeights::new(&model, pixels, texture.as_ref());

        let mut solver = S::default();
        let (grid, stats) = build_graph(&mut solver, &weights, &classes, roi, progress);

        advance(&mut self.phase, Phase::Solving);
        let flow = solver.maxflow();
        tracing::debug!("Max flow: {}", flow);

        let labels = Array2::from_shape_fn((roi.height, roi.width), |(i, j)| {
            match solver.segment(grid.node(i, j)) {
                Segment::Source => request.class_marker,
                Segment::Sink => 0,
            }
        });
        let object_pixels = labels.iter().filter(|&&v| v != 0).count();

        self.composite(roi, &labels);
        advance(&mut self.phase, Phase::Composited);

        Ok(Segmentation {
            roi,
            flow,
            object_pixels,
            stats,
            mask: self.roi_mask(roi),
        })
    }

    /// Add `labels` onto the persistent mask at the ROI offset, saturating at 255
    fn composite(&mut self, roi: Roi, labels: &Mask) {
        let _span = tracing::debug_span!("composite").entered();

        if let Some(last) = self.last_roi {
            if last != roi {
                tracing::debug!("Clearing previous region {}", last);
                self.mask
                    .slice_mut(s![last.y..last.y + last.height, last.x..last.x + last.width])
                    .fill(0);
            }
        }

        self.mask
            .slice_mut(s![roi.y..roi.y + roi.height, roi.x..roi.x + roi.width])
            .zip_mut_with(labels, |m, &l| *m = m.saturating_add(l));
        self.last_roi = Some(roi);
    }
}

fn advance(phase: &mut Phase, next: Phase) {
    tracing::debug!("Segmenter phase {:?} -> {:?}", phase, next);
    *phase = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    const GRAY: f32 = 0.5;
    const BRIGHT: f32 = 1.0;

    /// 4x4 uniform gray image with one bright pixel at (1, 1)
    fn bright_dot() -> Segmenter {
        let mut image = Array3::from_elem((4, 4, 3), GRAY);
        for c in 0..3 {
            image[[1, 1, c]] = BRIGHT;
        }
        Segmenter::new(image)
    }

    fn annotate(segmenter: &mut Segmenter) {
        segmenter.record_pixel(ClassId::Object, (1, 1)).unwrap();
        segmenter.record_pixel(ClassId::Background, (3, 3)).unwrap();
    }

    fn request(model: EnergyModel, use_texture: bool) -> SegmentRequest {
        SegmentRequest {
            model,
            use_texture,
            ..SegmentRequest::default()
        }
    }

    #[test]
    fn bright_dot_is_separated_from_background() {
        for use_texture in [false, true] {
            let mut segmenter = bright_dot();
            annotate(&mut segmenter);

            let result = segmenter
                .segment(&request(EnergyModel::Simple, use_texture), None)
                .unwrap();

            assert_eq!(result.mask[[1, 1]], 255);
            assert_eq!(result.mask[[3, 3]], 0);
            assert_eq!(result.object_pixels, 1);
            assert_eq!(result.stats.pairwise_edges, 24);
            assert_eq!(result.stats.terminal_edges, 16);
            assert_eq!(segmenter.phase(), Phase::Idle);
        }
    }

    #[test]
    fn probabilistic_model_separates_bright_dot() {
        let mut segmenter = bright_dot();
        annotate(&mut segmenter);

        let result = segmenter
            .segment(&request(EnergyModel::Probabilistic, true), None)
            .unwrap();

        assert_eq!(result.mask[[1, 1]], 255);
        assert_eq!(result.object_pixels, 1);
    }

    #[test]
    fn object_seeds_always_end_on_object_side() {
        let image = Array3::from_shape_fn((6, 7, 3), |(y, x, c)| {
            ((y * 7 + x * 3 + c) % 11) as f32 / 10.0
        });
        let object_seeds = [(0, 0), (2, 5), (5, 6), (3, 1)];
        let background_seeds = [(0, 6), (5, 0), (4, 4)];

        for model in [EnergyModel::Simple, EnergyModel::Probabilistic] {
            for use_texture in [false, true] {
                let mut segmenter: Segmenter = Segmenter::new(image.clone());
                for &seed in &object_seeds {
                    segmenter.record_pixel(ClassId::Object, seed).unwrap();
                }
                for &seed in &background_seeds {
                    segmenter.record_pixel(ClassId::Background, seed).unwrap();
                }

                let result = segmenter.segment(&request(model, use_texture), None).unwrap();
                for &(r, c) in &object_seeds {
                    assert_eq!(result.mask[[r, c]], 255, "{model:?} texture={use_texture}");
                }
                for &(r, c) in &background_seeds {
                    assert_eq!(result.mask[[r, c]], 0, "{model:?} texture={use_texture}");
                }
            }
        }
    }

    #[test]
    fn missing_annotation_aborts_without_side_effects() {
        let mut segmenter = bright_dot();
        segmenter.record_pixel(ClassId::Object, (1, 1)).unwrap();

        let err = segmenter.segment(&SegmentRequest::default(), None).unwrap_err();

        assert_eq!(err, SegmentError::InsufficientAnnotation);
        assert!(segmenter.mask().iter().all(|&v| v == 0));
        assert_eq!(segmenter.phase(), Phase::Idle);
    }

    #[test]
    fn seeds_outside_roi_abort_before_graph_construction() {
        let mut segmenter = bright_dot();
        annotate(&mut segmenter);

        let mut calls = 0;
        let mut observer = |_pct: usize| calls += 1;
        let req = SegmentRequest {
            roi: Some(Roi::new(0, 0, 2, 2)),
            ..SegmentRequest::default()
        };
        let err = segmenter
            .segment(&req, Some(&mut observer as Progress))
            .unwrap_err();

        assert_eq!(
            err,
            SegmentError::EmptySeedIntersection {
                class: ClassId::Background
            }
        );
        assert_eq!(calls, 0);
        assert!(segmenter.mask().iter().all(|&v| v == 0));
    }

    #[test]
    fn roi_outside_image_is_rejected() {
        let mut segmenter = bright_dot();
        annotate(&mut segmenter);

        let req = SegmentRequest {
            roi: Some(Roi::new(2, 2, 3, 3)),
            ..SegmentRequest::default()
        };
        assert!(matches!(
            segmenter.segment(&req, None),
            Err(SegmentError::InvalidRoi { .. })
        ));
    }

    #[test]
    fn roi_at_the_end_of_the_address_space_is_rejected() {
        let mut segmenter = bright_dot();
        annotate(&mut segmenter);

        for roi in [Roi::new(usize::MAX, 0, 2, 2), Roi::new(0, usize::MAX, 2, 2)] {
            let req = SegmentRequest {
                roi: Some(roi),
                ..SegmentRequest::default()
            };
            assert_eq!(
                segmenter.segment(&req, None).unwrap_err(),
                SegmentError::InvalidRoi {
                    roi,
                    width: 4,
                    height: 4
                }
            );
        }
        assert!(segmenter.mask().iter().all(|&v| v == 0));
        assert_eq!(segmenter.phase(), Phase::Idle);
    }

    #[test]
    fn annotation_outside_image_names_the_coordinate() {
        let mut segmenter = bright_dot();

        let err = segmenter.record_pixel(ClassId::Object, (1, 4)).unwrap_err();

        assert_eq!(
            err,
            SegmentError::CoordinateOutOfBounds {
                row: 1,
                col: 4,
                width: 4,
                height: 4
            }
        );
        assert_eq!(segmenter.classes().seed_count(ClassId::Object), 0);
    }

    #[test]
    fn reset_makes_cycles_independent() {
        let mut fresh = bright_dot();
        annotate(&mut fresh);
        let expected = fresh
            .segment(&request(EnergyModel::Probabilistic, false), None)
            .unwrap();

        let mut reused = bright_dot();
        reused.record_pixel(ClassId::Object, (0, 0)).unwrap();
        reused.record_pixel(ClassId::Background, (1, 1)).unwrap();
        reused.reset();
        assert!(!reused.classes().is_ready());

        annotate(&mut reused);
        let actual = reused
            .segment(&request(EnergyModel::Probabilistic, false), None)
            .unwrap();

        assert_eq!(expected.mask, actual.mask);
    }

    #[test]
    fn same_roi_accumulates_and_saturates() {
        let mut segmenter = bright_dot();
        annotate(&mut segmenter);

        let req = SegmentRequest {
            class_marker: 200,
            ..SegmentRequest::default()
        };
        segmenter.segment(&req, None).unwrap();
        assert_eq!(segmenter.mask()[[1, 1]], 200);

        let result = segmenter.segment(&req, None).unwrap();
        assert_eq!(result.mask[[1, 1]], 255);
        assert_eq!(segmenter.mask()[[0, 0]], 0);
    }

    #[test]
    fn new_roi_clears_previous_region() {
        let mut segmenter = bright_dot();
        annotate(&mut segmenter);

        segmenter.segment(&SegmentRequest::default(), None).unwrap();
        assert_eq!(segmenter.mask()[[1, 1]], 255);

        segmenter.reset();
        segmenter.record_pixel(ClassId::Object, (2, 2)).unwrap();
        segmenter.record_pixel(ClassId::Background, (3, 3)).unwrap();
        let req = SegmentRequest {
            roi: Some(Roi::new(2, 2, 2, 2)),
            ..SegmentRequest::default()
        };
        let result = segmenter.segment(&req, None).unwrap();

        assert_eq!(segmenter.mask()[[1, 1]], 0);
        assert_eq!(result.mask.dim(), (2, 2));
        assert_eq!(result.mask[[0, 0]], 255);
        assert_eq!(result.mask[[1, 1]], 0);
    }

    #[test]
    fn full_histogram_coverage_gives_finite_terminals() {
        let image = Array3::from_shape_fn((3, 3, 3), |(y, x, _)| (y * 3 + x) as f32 / 8.0);
        let mut segmenter: Segmenter = Segmenter::new(image.clone());
        for y in 0..3 {
            for x in 0..3 {
                segmenter.record_pixel(ClassId::Object, (y, x)).unwrap();
            }
        }
        segmenter.record_pixel(ClassId::Background, (0, 0)).unwrap();

        let model = WeightModel::prepare(
            EnergyModel::Probabilistic,
            segmenter.classes(),
            Roi::full(3, 3),
            image.view(),
        )
        .unwrap();

        // the object histogram covers every colour, so the link tying a pixel
        // to the background is always finite
        for y in 0..3 {
            for x in 0..3 {
                let pixel = image.slice(s![y, x, ..]);
                assert!(model.terminal(pixel, ClassId::Background).is_finite());
            }
        }
    }
}
