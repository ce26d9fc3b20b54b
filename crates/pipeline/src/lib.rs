//! Video palette pipeline
//!
//! Turns a video into a time-segmented table of dominant colors:
//! resolve the input and output locators, fetch the media, walk the timeline
//! one segment at a time, stream each palette into a CSV table and hand the
//! finished table to the destination.

pub mod aggregator;
pub mod context;
pub mod scheduler;
pub mod visualize;

use async_trait::async_trait;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use video_palette_common::{PaletteError, Result};
use video_palette_extraction::PaletteExtractor;
use video_palette_ingestion::{FfmpegMediaSource, MediaSource};
use video_palette_locator::replace_url_with_bucket_mapping;
use video_palette_storage::{Destination, SourceProvider, Transfer};

pub use aggregator::{ResultAggregator, SourceMeta, COLUMNS, WEIGHT_COLUMN};
pub use context::{PipelineConfig, RunContext, RunRequest};
pub use scheduler::{Phase, SchedulerState, Segment, SegmentScheduler, StepOutcome};
pub use visualize::Visualizer;

/// Opens a fetched media file for frame reads
#[async_trait]
pub trait MediaOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>>;
}

/// [`MediaOpener`] backed by `ffprobe`/`ffmpeg`
#[derive(Debug, Clone)]
pub struct FfmpegOpener {
    probe_timeout: Duration,
}

impl FfmpegOpener {
    #[must_use]
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }
}

#[async_trait]
impl MediaOpener for FfmpegOpener {
    async fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        let source = FfmpegMediaSource::open(path, self.probe_timeout).await?;
        Ok(Box::new(source))
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Offsets visited, empty ones included
    pub steps: u32,
    pub segments: u32,
    pub rows: usize,
    /// Where the table went, `<discard>` when it was dropped
    pub output: String,
    /// CDN address of the table, when its bucket has a mapping
    pub public_url: Option<String>,
}

/// Runs the pipeline for one [`RunContext`] at a time
pub struct Orchestrator {
    transfer: Transfer,
    opener: Arc<dyn MediaOpener>,
    extractor: Arc<dyn PaletteExtractor>,
    config: PipelineConfig,
}

impl Orchestrator {
    /// Orchestrator that decodes media with the ffmpeg tools
    pub fn new(
        transfer: Transfer,
        extractor: Arc<dyn PaletteExtractor>,
        config: PipelineConfig,
    ) -> Self {
        let opener = Arc::new(FfmpegOpener::new(config.probe_timeout));
        Self::with_opener(transfer, opener, extractor, config)
    }

    pub fn with_opener(
        transfer: Transfer,
        opener: Arc<dyn MediaOpener>,
        extractor: Arc<dyn PaletteExtractor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            transfer,
            opener,
            extractor,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce the palette table for `ctx` and deliver it.
    ///
    /// The first error aborts the run. The per-run working directory, which
    /// holds the downloaded input and the table, is removed on every path.
    pub async fn run(&self, ctx: &RunContext) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        info!("Run {}: {} -> {}", run_id, ctx.input, ctx.output);

        // Both ends are checked before any media work
        let source = SourceProvider::for_locator(&ctx.input, &self.transfer)?;
        let destination = Destination::for_locator(&ctx.output, &self.transfer)?;
        let visualizer = ctx.visualization.as_ref().map(Visualizer::new).transpose()?;

        let work_dir = tempfile::Builder::new()
            .prefix(&format!("video-palette-{run_id}-"))
            .tempdir_in(&self.config.work_root)?;
        debug!("Working directory {}", work_dir.path().display());

        let fetched = source.local_path(work_dir.path()).await?;
        let media = self.opener.open(&fetched.path).await?;
        let info = media.info().clone();
        info!(
            "Media {}: {:.3}s at {:.3} fps, {}x{}",
            fetched.path.display(),
            info.duration_seconds(),
            info.fps,
            info.width,
            info.height
        );

        let table_path = work_dir.path().join(format!("{run_id}.csv"));
        let source_meta = SourceMeta {
            serial: ctx.input_serial.clone(),
            url: ctx.input.raw().to_string(),
            duration_seconds: info.duration_seconds(),
            fps: info.fps,
        };

        let state = tokio::task::spawn_blocking({
            let extractor = Arc::clone(&self.extractor);
            let ctx = ctx.clone();
            let table_path = table_path.clone();
            let downscale_factor = self.config.downscale_factor;
            move || {
                write_table(
                    media,
                    extractor.as_ref(),
                    &ctx,
                    visualizer.as_ref(),
                    downscale_factor,
                    &table_path,
                    source_meta,
                )
            }
        })
        .await
        .map_err(|e| {
            PaletteError::IoError(std::io::Error::other(format!("segment worker: {e}")))
        })??;

        destination.upload_file(&table_path).await?;

        let output = ctx
            .output
            .object_address()
            .map_or_else(|| ctx.output.to_string(), ToString::to_string);
        let public_url = ctx
            .output
            .object_address()
            .filter(|address| self.config.cdn_mapping.lookup(&address.bucket).is_some())
            .map(|address| {
                replace_url_with_bucket_mapping(&address.to_url(), &self.config.cdn_mapping)
            });

        if let Err(e) = work_dir.close() {
            warn!("Failed to remove working directory: {}", e);
        }

        let summary = RunSummary {
            run_id,
            steps: state.steps,
            segments: state.emitted,
            rows: state.rows,
            output,
            public_url,
        };
        info!(
            "Run {} complete: {} segments, {} rows, {} steps",
            run_id, summary.segments, summary.rows, summary.steps
        );
        Ok(summary)
    }
}

struct TableState {
    steps: u32,
    emitted: u32,
    rows: usize,
}

fn write_table(
    mut media: Box<dyn MediaSource>,
    extractor: &dyn PaletteExtractor,
    ctx: &RunContext,
    visualizer: Option<&Visualizer>,
    downscale_factor: f64,
    table_path: &Path,
    source_meta: SourceMeta,
) -> Result<TableState> {
    let label = table_path.display().to_string();
    let file = File::create(table_path).map_err(|e| PaletteError::sink_write(&label, e))?;
    let mut sink = ResultAggregator::new(file, label, source_meta, ctx.variant.reports_weight());

    let state = SegmentScheduler::new(media.as_mut(), extractor, ctx)
        .with_visualizer(visualizer)
        .with_downscale_factor(downscale_factor)
        .run(&mut sink)?;

    let rows = sink.rows_written();
    sink.into_inner()?;
    Ok(TableState {
        steps: state.steps,
        emitted: state.emitted,
        rows,
    })
}
