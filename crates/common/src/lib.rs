//! Common types and errors shared by the palette extraction crates
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Maximum value of a 16-bit color channel
pub const CHANNEL_MAX: f64 = 65535.0;

/// Pipeline errors
///
/// Every variant aborts the run. The first error raised is returned to the
/// caller unchanged.
#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("Locator unresolved: {0}")]
    LocatorUnresolved(String),

    #[error("Failed to decode object key in {uri}: {reason}")]
    KeyDecodeError { uri: String, reason: String },

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("Unsupported destination: {0}")]
    UnsupportedDestination(String),

    #[error("Transfer failed for {target}: {reason}")]
    TransferError { target: String, reason: String },

    #[error("Failed to open media {path}: {reason}")]
    MediaOpenError { path: PathBuf, reason: String },

    #[error("Palette extraction failed: {0}")]
    ExtractionError(String),

    #[error("Failed to write results to {target}: {reason}")]
    SinkWriteError { target: String, reason: String },

    #[error("Failed to write visualization {path}: {reason}")]
    VisualizationError { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PaletteError {
    pub fn transfer(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::TransferError {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn media_open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MediaOpenError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn sink_write(target: impl Into<String>, reason: impl ToString) -> Self {
        Self::SinkWriteError {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn visualization(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::VisualizationError {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for palette pipeline operations
pub type Result<T> = std::result::Result<T, PaletteError>;

/// RGBA color with 16 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba16 {
    pub r: u16,
    pub g: u16,
    pub b: u16,
    pub a: u16,
}

impl Rgba16 {
    #[must_use]
    pub const fn new(r: u16, g: u16, b: u16, a: u16) -> Self {
        Self { r, g, b, a }
    }

    /// Widen an 8-bit color (`c * 257` maps 0..=255 onto 0..=65535)
    #[must_use]
    pub const fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as u16 * 257,
            g: g as u16 * 257,
            b: b as u16 * 257,
            a: a as u16 * 257,
        }
    }

    /// Narrow to 8 bits per channel
    #[must_use]
    pub const fn to_rgba8(self) -> [u8; 4] {
        [
            (self.r >> 8) as u8,
            (self.g >> 8) as u8,
            (self.b >> 8) as u8,
            (self.a >> 8) as u8,
        ]
    }

    /// Red, green and blue each divided by 65535
    #[must_use]
    pub fn normalized_rgb(self) -> [f64; 3] {
        [
            f64::from(self.r) / CHANNEL_MAX,
            f64::from(self.g) / CHANNEL_MAX,
            f64::from(self.b) / CHANNEL_MAX,
        ]
    }
}

/// One color returned by a palette extractor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaletteColor {
    pub color: Rgba16,
    /// Share of the frame covered by this color, when the variant reports it
    pub weight: Option<f64>,
}

impl PaletteColor {
    #[must_use]
    pub const fn new(color: Rgba16, weight: Option<f64>) -> Self {
        Self { color, weight }
    }
}

/// Palette extraction algorithm selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum ExtractionVariant {
    /// Wu color quantization
    #[default]
    QuantWu,
    /// Weighted sort-means seeded by Wu quantization
    WsmWu,
    /// K-means clustering, reports per-color weights
    KMeans,
}

impl ExtractionVariant {
    /// Whether extractors running this variant report weights
    #[must_use]
    pub const fn reports_weight(self) -> bool {
        matches!(self, Self::KMeans)
    }

    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::QuantWu => 0,
            Self::WsmWu => 1,
            Self::KMeans => 2,
        }
    }
}

impl TryFrom<u8> for ExtractionVariant {
    type Error = PaletteError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::QuantWu),
            1 => Ok(Self::WsmWu),
            2 => Ok(Self::KMeans),
            other => Err(PaletteError::InvalidConfig(format!(
                "unknown extraction variant {other}"
            ))),
        }
    }
}

impl From<ExtractionVariant> for u8 {
    fn from(variant: ExtractionVariant) -> Self {
        variant.code()
    }
}

/// One output row before serialization
#[derive(Debug, Clone, PartialEq)]
pub struct ColorSample {
    pub sample_id: Uuid,
    pub palette_id: Uuid,
    pub color: Rgba16,
    pub weight: Option<f64>,
    pub normalized_rgb: [f64; 3],
}

impl ColorSample {
    #[must_use]
    pub fn new(sample_id: Uuid, palette_id: Uuid, palette_color: PaletteColor) -> Self {
        Self {
            sample_id,
            palette_id,
            color: palette_color.color,
            weight: palette_color.weight,
            normalized_rgb: palette_color.color.normalized_rgb(),
        }
    }
}

/// Probed properties of a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_ms: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub codec: Option<String>,
}

impl MediaInfo {
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}
