//! Palette extraction through an external program
//!
//! The frame is written to a scratch PNG and the program is invoked as
//! `program [args...] --k <k> --variant <code> <png>`. It must print a JSON
//! array on stdout:
//!
//! ```json
//! [{"r": 65535, "g": 0, "b": 0, "a": 65535, "weight": 0.42}]
//! ```
//!
//! Channels are 16-bit. `weight` may be omitted.

use crate::PaletteExtractor;
use image::{ImageFormat, RgbImage};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;
use video_palette_common::{ExtractionVariant, PaletteColor, PaletteError, Result, Rgba16};

#[derive(Debug, Deserialize)]
struct ExtractedColor {
    r: u16,
    g: u16,
    b: u16,
    a: u16,
    #[serde(default)]
    weight: Option<f64>,
}

impl From<ExtractedColor> for PaletteColor {
    fn from(c: ExtractedColor) -> Self {
        PaletteColor::new(Rgba16::new(c.r, c.g, c.b, c.a), c.weight)
    }
}

/// Extractor that delegates clustering to an external command
#[derive(Debug, Clone)]
pub struct CommandPaletteExtractor {
    program: PathBuf,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl CommandPaletteExtractor {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Arguments passed before the generated ones
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Directory for the scratch PNG handed to the program
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl PaletteExtractor for CommandPaletteExtractor {
    fn extract(
        &self,
        image: &RgbImage,
        k: u32,
        variant: ExtractionVariant,
    ) -> Result<Vec<PaletteColor>> {
        // Removed when dropped, on every return path
        let scratch = tempfile::Builder::new()
            .prefix("palette-frame-")
            .suffix(".png")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| PaletteError::ExtractionError(format!("scratch file: {e}")))?;
        image
            .save_with_format(scratch.path(), ImageFormat::Png)
            .map_err(|e| PaletteError::ExtractionError(format!("encode frame: {e}")))?;

        debug!(
            "Running {} k={} variant={}",
            self.program.display(),
            k,
            variant.code()
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .args(["--k", &k.to_string(), "--variant", &variant.code().to_string()])
            .arg(scratch.path())
            .output()
            .map_err(|e| {
                PaletteError::ExtractionError(format!(
                    "failed to execute {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            return Err(PaletteError::ExtractionError(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_colors(&output.stdout)
    }
}

/// Parse the JSON color array printed by an extractor program
pub fn parse_colors(stdout: &[u8]) -> Result<Vec<PaletteColor>> {
    let colors: Vec<ExtractedColor> = serde_json::from_slice(stdout)
        .map_err(|e| PaletteError::ExtractionError(format!("invalid extractor output: {e}")))?;
    Ok(colors.into_iter().map(PaletteColor::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_colors_with_and_without_weight() {
        let json = br#"[
            {"r": 65535, "g": 0, "b": 0, "a": 65535, "weight": 0.75},
            {"r": 0, "g": 257, "b": 514, "a": 65535}
        ]"#;
        let colors = parse_colors(json).unwrap();
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].color, Rgba16::new(65535, 0, 0, 65535));
        assert_eq!(colors[0].weight, Some(0.75));
        assert_eq!(colors[1].weight, None);
    }

    #[test]
    fn test_parse_colors_rejects_out_of_range_channel() {
        let json = br#"[{"r": 70000, "g": 0, "b": 0, "a": 0}]"#;
        assert!(matches!(
            parse_colors(json),
            Err(PaletteError::ExtractionError(_))
        ));
    }

    #[test]
    fn test_missing_program_is_extraction_error() {
        let extractor = CommandPaletteExtractor::new("/nonexistent/palette-extractor");
        let frame = RgbImage::new(2, 2);
        assert!(matches!(
            extractor.extract(&frame, 3, ExtractionVariant::QuantWu),
            Err(PaletteError::ExtractionError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_program_output_is_parsed() {
        let extractor = CommandPaletteExtractor::new("sh").with_args([
            "-c",
            r#"echo '[{"r":1,"g":2,"b":3,"a":65535}]'"#,
            "extractor",
        ]);
        let frame = RgbImage::new(2, 2);
        let colors = extractor
            .extract(&frame, 3, ExtractionVariant::QuantWu)
            .unwrap();
        assert_eq!(colors, vec![PaletteColor::new(Rgba16::new(1, 2, 3, 65535), None)]);
    }
}
