//! Run configuration
//!
//! [`RunRequest`] is the caller-facing payload (JSON or CLI flags).
//! [`RunContext`] is its validated, resolved form and stays read-only for
//! the whole run. [`PipelineConfig`] carries process-level settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use video_palette_common::{ExtractionVariant, PaletteError, Result};
use video_palette_extraction::DOWNSCALE_FACTOR;
use video_palette_ingestion::PROBE_TIMEOUT;
use video_palette_locator::{resolve, BucketMapping, Locator};

/// Default bound on a single fetch or upload
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// Palette generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(rename = "sourceURL")]
    pub source_url: String,
    #[serde(default)]
    pub source_serial: String,
    pub period_seconds: f64,
    pub palette_size: u32,
    #[serde(default)]
    pub function_type: u8,
    #[serde(rename = "destinationURI", default)]
    pub destination_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualize_output_folder: Option<PathBuf>,
}

/// Validated configuration of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunContext {
    pub input: Locator,
    /// Copied verbatim into every output row
    pub input_serial: String,
    pub segment_duration_seconds: f64,
    pub palette_size: u32,
    pub variant: ExtractionVariant,
    pub output: Locator,
    pub visualization: Option<PathBuf>,
}

impl RunContext {
    /// Resolve both locators and validate the numeric settings
    pub fn from_request(request: &RunRequest) -> Result<Self> {
        let period = request.period_seconds;
        if !period.is_finite() || period <= 0.0 {
            return Err(PaletteError::InvalidConfig(format!(
                "segment duration must be positive, got {period}"
            )));
        }
        if (period * 1000.0).round() < 1.0 {
            return Err(PaletteError::InvalidConfig(format!(
                "segment duration {period}s is shorter than one millisecond"
            )));
        }
        if request.palette_size == 0 {
            return Err(PaletteError::InvalidConfig(
                "palette size must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            input: resolve(&request.source_url)?,
            input_serial: request.source_serial.clone(),
            segment_duration_seconds: period,
            palette_size: request.palette_size,
            variant: ExtractionVariant::try_from(request.function_type)?,
            output: resolve(&request.destination_uri)?,
            visualization: request.visualize_output_folder.clone(),
        })
    }

    /// Distance between segment start offsets
    #[must_use]
    pub fn step_ms(&self) -> u64 {
        (self.segment_duration_seconds * 1000.0).round() as u64
    }
}

/// Process-level pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub transfer_timeout: Duration,
    pub probe_timeout: Duration,
    pub downscale_factor: f64,
    /// Parent of the per-run working directories
    pub work_root: PathBuf,
    /// Bucket to CDN host mapping used to report a public URL for the output
    pub cdn_mapping: BucketMapping,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            downscale_factor: DOWNSCALE_FACTOR,
            work_root: std::env::temp_dir(),
            cdn_mapping: BucketMapping::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by `VIDEO_PALETTE_WORK_DIR`,
    /// `VIDEO_PALETTE_TRANSFER_TIMEOUT_SECS` and `S3_CDN_MAPPING`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("VIDEO_PALETTE_WORK_DIR") {
            config.work_root = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("VIDEO_PALETTE_TRANSFER_TIMEOUT_SECS") {
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                PaletteError::InvalidConfig(format!("VIDEO_PALETTE_TRANSFER_TIMEOUT_SECS: {e}"))
            })?;
            config.transfer_timeout = Duration::from_secs(secs);
        }
        if let Ok(mapping) = std::env::var("S3_CDN_MAPPING") {
            config.cdn_mapping = BucketMapping::parse(&mapping)?;
        }

        Ok(config)
    }
}
