//! video-palette CLI
//!
//! Extract time-segmented dominant color palettes from a video into CSV.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use video_palette_extraction::CommandPaletteExtractor;
use video_palette_pipeline::{Orchestrator, PipelineConfig, RunContext, RunRequest};
use video_palette_storage::{S3Config, S3ObjectStore, Transfer};

#[derive(Parser)]
#[command(
    name = "video-palette",
    version,
    about = "Extract time-segmented color palettes from video",
    after_help = "EXAMPLES:\n  \
                  video-palette -i clip.mp4 -d 2 -k 5 -o palette.csv --extractor-cmd ./palette\n  \
                  video-palette -i https://media.s3.amazonaws.com/clip.mp4 -o https://out.s3.ap-southeast-1.amazonaws.com/clip.csv\n  \
                  video-palette --request run.json\n  \
                  video-palette -i clip.mp4 visualize --visualize-output-folder ./viz"
)]
struct Cli {
    /// Input video: local path, file:// URI or S3 URL
    #[arg(short = 'i', long = "input-file", required_unless_present = "request")]
    input_file: Option<String>,

    /// Serial copied into every output row
    #[arg(long, default_value = "")]
    input_serial: String,

    /// Segment duration in seconds
    #[arg(short = 'd', long = "period-duration", default_value_t = 1.0)]
    period_duration: f64,

    /// Number of colors per segment
    #[arg(short = 'k', long, default_value_t = 5)]
    palette_size: u32,

    /// Extraction variant: 0 = quantized Wu, 1 = weighted Wu, 2 = k-means
    #[arg(long, default_value_t = 0)]
    function_type: u8,

    /// Output table: local path, file:// URI or S3 URL; empty discards it
    #[arg(short = 'o', long = "csv-result", default_value = "")]
    csv_result: String,

    /// Read the whole run request from a JSON file instead of flags
    #[arg(long, conflicts_with = "input_file")]
    request: Option<PathBuf>,

    /// Palette extractor program
    #[arg(long, env = "VIDEO_PALETTE_EXTRACTOR")]
    extractor_cmd: PathBuf,

    /// Extra argument for the extractor program (repeatable)
    #[arg(long = "extractor-arg", allow_hyphen_values = true)]
    extractor_args: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Also write a frame + palette composite for every segment
    Visualize {
        #[arg(long = "visualize-output-folder")]
        visualize_output_folder: PathBuf,
    },
}

impl Cli {
    fn run_request(&self) -> Result<RunRequest> {
        let mut request = match &self.request {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid run request in {}", path.display()))?
            }
            None => RunRequest {
                source_url: self.input_file.clone().unwrap_or_default(),
                source_serial: self.input_serial.clone(),
                period_seconds: self.period_duration,
                palette_size: self.palette_size,
                function_type: self.function_type,
                destination_uri: self.csv_result.clone(),
                visualize_output_folder: None,
            },
        };

        if let Some(Commands::Visualize {
            visualize_output_folder,
        }) = &self.command
        {
            request.visualize_output_folder = Some(visualize_output_folder.clone());
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let request = cli.run_request()?;
    let ctx = RunContext::from_request(&request).context("Invalid run configuration")?;
    let config = PipelineConfig::from_env().context("Invalid environment configuration")?;

    let store = Arc::new(S3ObjectStore::new(S3Config::default()));
    let transfer = Transfer::new(store, config.transfer_timeout);
    let extractor = CommandPaletteExtractor::new(&cli.extractor_cmd)
        .with_args(cli.extractor_args.iter().cloned())
        .with_scratch_dir(&config.work_root);

    let orchestrator = Orchestrator::new(transfer, Arc::new(extractor), config);
    let summary = orchestrator.run(&ctx).await.context("Palette run failed")?;

    info!(
        "Wrote {} rows for {} segments to {}",
        summary.rows, summary.segments, summary.output
    );
    if let Some(url) = &summary.public_url {
        info!("Public URL: {}", url);
    }
    Ok(())
}
