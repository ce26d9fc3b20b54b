//! Streaming CSV result table
//!
//! Rows are appended one segment at a time. The header goes out exactly once,
//! in front of the first segment that yields colors, and every segment batch
//! reaches the sink as one write followed by a flush. A run that fails midway
//! therefore leaves a table made of whole segments only.

use std::io::Write;
use uuid::Uuid;
use video_palette_common::{ColorSample, PaletteColor, PaletteError, Result};

use crate::scheduler::Segment;

/// Output columns, in order
pub const COLUMNS: [&str; 16] = [
    "source_serial",
    "source_url",
    "source_duration_seconds",
    "source_fps",
    "sample_id",
    "sample_number",
    "sample_duration",
    "palette_id",
    "palette_counts",
    "r",
    "g",
    "b",
    "a",
    "r_norm",
    "g_norm",
    "b_norm",
];

/// Trailing column emitted by variants that report weights
pub const WEIGHT_COLUMN: &str = "weight";

/// Per-run source columns repeated on every row
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMeta {
    pub serial: String,
    /// Input URI as given, not the downloaded local path
    pub url: String,
    pub duration_seconds: f64,
    pub fps: f64,
}

/// Append-only writer of the result table
pub struct ResultAggregator<W: Write> {
    sink: W,
    target: String,
    source: SourceMeta,
    include_weight: bool,
    header_written: bool,
    rows_written: usize,
}

impl<W: Write> ResultAggregator<W> {
    /// `target` names the sink in error messages
    pub fn new(
        sink: W,
        target: impl Into<String>,
        source: SourceMeta,
        include_weight: bool,
    ) -> Self {
        Self {
            sink,
            target: target.into(),
            source,
            include_weight,
            header_written: false,
            rows_written: 0,
        }
    }

    #[must_use]
    pub fn header_written(&self) -> bool {
        self.header_written
    }

    #[must_use]
    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Append the rows of one segment and flush them.
    ///
    /// An empty palette writes nothing, header included. Returns the number
    /// of rows written.
    pub fn flush_segment(
        &mut self,
        segment: &Segment,
        palette_id: Uuid,
        colors: &[PaletteColor],
    ) -> Result<usize> {
        if colors.is_empty() {
            return Ok(0);
        }

        let batch = self.encode_batch(segment, palette_id, colors)?;
        self.sink
            .write_all(&batch)
            .and_then(|()| self.sink.flush())
            .map_err(|e| PaletteError::sink_write(&self.target, e))?;

        self.header_written = true;
        self.rows_written += colors.len();
        Ok(colors.len())
    }

    /// Flush and hand back the sink
    pub fn into_inner(mut self) -> Result<W> {
        self.sink
            .flush()
            .map_err(|e| PaletteError::sink_write(&self.target, e))?;
        Ok(self.sink)
    }

    fn encode_batch(
        &self,
        segment: &Segment,
        palette_id: Uuid,
        colors: &[PaletteColor],
    ) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        let encode_err = |e: csv::Error| PaletteError::sink_write(&self.target, e);

        if !self.header_written {
            let mut header: Vec<&str> = COLUMNS.to_vec();
            if self.include_weight {
                header.push(WEIGHT_COLUMN);
            }
            writer.write_record(&header).map_err(encode_err)?;
        }

        let palette_counts = colors.len().to_string();
        for color in colors {
            let sample = ColorSample::new(segment.sample_id, palette_id, *color);
            let [r_norm, g_norm, b_norm] = sample.normalized_rgb;
            let mut record = vec![
                self.source.serial.clone(),
                self.source.url.clone(),
                self.source.duration_seconds.to_string(),
                self.source.fps.to_string(),
                sample.sample_id.to_string(),
                segment.index.to_string(),
                segment.duration_seconds.to_string(),
                sample.palette_id.to_string(),
                palette_counts.clone(),
                sample.color.r.to_string(),
                sample.color.g.to_string(),
                sample.color.b.to_string(),
                sample.color.a.to_string(),
                r_norm.to_string(),
                g_norm.to_string(),
                b_norm.to_string(),
            ];
            if self.include_weight {
                record.push(sample.weight.map(|w| w.to_string()).unwrap_or_default());
            }
            writer.write_record(&record).map_err(encode_err)?;
        }

        writer
            .into_inner()
            .map_err(|e| PaletteError::sink_write(&self.target, e.error()))
    }
}
