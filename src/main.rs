mod input;
mod output;
mod segmentation;
mod solver;

use anyhow::{bail, Context, Result};
use clap::Parser;
use input::{AnnotationSource, FileImage, ImageSource, ScribbleImage};
use output::{MaskFile, OutputSink};
use segmentation::{ClassId, EnergyModel, Progress, Roi, SegmentRequest, Segmenter};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image to segment
    input_image: PathBuf,

    /// Where the single-channel label mask is written
    output_image: PathBuf,

    /// Number of classes the label range is split into
    /// Defaults to the number of scribble files
    #[arg(value_parser = clap::value_parser!(u8).range(1..))]
    num_classes: Option<u8>,

    /// Scribble image per class pass (blue = object, red = background)
    #[arg(short, long, required = true)]
    scribbles: Vec<PathBuf>,

    /// Region of interest as x,y,width,height
    #[arg(long, value_parser = parse_roi)]
    roi: Option<Roi>,

    /// Energy model used for edge and terminal weights
    #[arg(short, long, value_enum, default_value_t = EnergyModel::Simple)]
    model: EnergyModel,

    /// Disable the texture penalty on boundary weights
    #[arg(long)]
    no_texture: bool,

    /// Resize input and scribbles at load time, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Load the input as grayscale
    #[arg(long)]
    grayscale: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn parse_roi(value: &str) -> std::result::Result<Roi, String> {
    let parts: Vec<usize> = value
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| format!("invalid ROI '{value}': {e}"))?;

    match parts.as_slice() {
        &[x, y, width, height] => Ok(Roi::new(x, y, width, height)),
        _ => Err(format!("ROI must be x,y,width,height, got '{value}'")),
    }
}

fn parse_size(value: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("size must be WIDTHxHEIGHT, got '{value}'"))?;
    let width = w.trim().parse().map_err(|e| format!("invalid width '{w}': {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("invalid height '{h}': {e}"))?;
    Ok((width, height))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("graphcut starting");
    tracing::info!("Model: {:?}, texture: {}", args.model, !args.no_texture);

    let num_classes = args.num_classes.unwrap_or(args.scribbles.len().min(255) as u8);
    if (num_classes as usize) < args.scribbles.len() {
        bail!(
            "{} scribble files given but only {} classes",
            args.scribbles.len(),
            num_classes
        );
    }

    let source = FileImage::new(&args.input_image)
        .with_resize(args.resize)
        .with_grayscale(args.grayscale);
    let scribbles: Vec<ScribbleImage> = args.scribbles.iter().map(ScribbleImage::new).collect();
    let mut output = MaskFile::new(&args.output_image);

    let settings = PipelineSettings {
        roi: args.roi,
        model: args.model,
        use_texture: !args.no_texture,
        num_classes,
    };

    run_pipeline(&source, &scribbles, &mut output, &settings)?;

    Ok(())
}

struct PipelineSettings {
    roi: Option<Roi>,
    model: EnergyModel,
    use_texture: bool,
    num_classes: u8,
}

/// One class pass per annotation source, each composited onto the same mask
fn run_pipeline<I, A, O>(
    source: &I,
    annotations: &[A],
    output: &mut O,
    settings: &PipelineSettings,
) -> Result<()>
where
    I: ImageSource,
    A: AnnotationSource,
    O: OutputSink,
{
    let image = source.read_image().context("Failed to read input image")?;
    let mut segmenter: Segmenter = Segmenter::new(image);
    let (width, height) = segmenter.dimensions();
    let step = 255 / settings.num_classes;

    for (pass, annotation_source) in annotations.iter().enumerate() {
        let class_marker = step * (pass as u8 + 1);
        tracing::info!(
            "Class pass {}/{} (marker {})",
            pass + 1,
            annotations.len(),
            class_marker
        );

        segmenter.reset();
        let points = annotation_source
            .annotations(width as u32, height as u32)
            .context("Failed to read annotations")?;
        for point in points {
            segmenter
                .record_pixel(point.class, (point.y, point.x))
                .context("Failed to record annotation")?;
        }
        tracing::debug!(
            "Seeds: {} object, {} background",
            segmenter.classes().seed_count(ClassId::Object),
            segmenter.classes().seed_count(ClassId::Background)
        );

        let request = SegmentRequest {
            roi: settings.roi,
            model: settings.model,
            use_texture: settings.use_texture,
            class_marker,
        };

        let mut last_reported = None;
        let mut observer = |pct: usize| {
            let decile = pct / 10;
            if last_reported != Some(decile) {
                last_reported = Some(decile);
                tracing::debug!("Constructing graph: {}%", pct);
            }
        };

        let started = Instant::now();
        let result = segmenter
            .segment(&request, Some(&mut observer as Progress))
            .context("Segmentation failed")?;
        tracing::info!(
            "Pass {} done in {:.1}ms: {} ({} nodes, {} pairwise edges, {} terminal pairs), flow={:.3}",
            pass + 1,
            started.elapsed().as_secs_f64() * 1000.0,
            result.roi,
            result.stats.nodes,
            result.stats.pairwise_edges,
            result.stats.terminal_edges,
            result.flow
        );
        tracing::debug!(
            "Segmenter {:?}, {} labelled pixels in the persistent mask",
            segmenter.phase(),
            segmenter.mask().iter().filter(|&&v| v != 0).count()
        );

        output
            .write_mask(&result.mask)
            .context("Failed to write mask")?;
    }

    Ok(())
}
