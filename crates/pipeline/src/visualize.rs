//! Per-segment palette visualization
//!
//! For each emitted segment the representative frame is saved, a swatch strip
//! of the palette is drawn, and both are joined side by side into
//! `visualize_{step}__segment_{n}.png`. The two intermediate images are
//! removed once the composite is on disk.

use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::debug;
use video_palette_common::{PaletteColor, PaletteError, Result};

/// Horizontal pixel budget shared by the swatch blocks
pub const SWATCH_WIDTH: u32 = 1280;

/// Writes composite frame + palette images into one folder
#[derive(Debug, Clone)]
pub struct Visualizer {
    output_dir: PathBuf,
}

impl Visualizer {
    /// Create the output folder if needed
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| PaletteError::visualization(&output_dir, e))?;
        Ok(Self { output_dir })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render the composite for one segment and return its path.
    ///
    /// `step` counts timeline steps, empty ones included; `segment` is the
    /// 1-based segment number.
    pub fn render(
        &self,
        step: u32,
        segment: u32,
        frame: &RgbImage,
        colors: &[PaletteColor],
    ) -> Result<PathBuf> {
        let suffix = format!("{step}__segment_{segment}.png");
        let frame_path = self.output_dir.join(format!("frame_{suffix}"));
        let palette_path = self.output_dir.join(format!("palette_{suffix}"));
        let composite_path = self.output_dir.join(format!("visualize_{suffix}"));

        let strip = swatch_strip(colors)?;
        let frame = DynamicImage::ImageRgb8(frame.clone()).to_rgba8();
        save(&frame, &frame_path)?;

        let composite = match &strip {
            Some(strip) => {
                save(strip, &palette_path)?;
                compose(&frame, strip)
            }
            None => frame,
        };
        save(&composite, &composite_path)?;

        remove(&frame_path)?;
        if strip.is_some() {
            remove(&palette_path)?;
        }

        debug!("Wrote {}", composite_path.display());
        Ok(composite_path)
    }
}

/// Draw one square block per color within [`SWATCH_WIDTH`].
///
/// The canvas is four blocks tall; only the top band is painted and the rest
/// stays transparent. Returns `None` for an empty palette.
pub fn swatch_strip(colors: &[PaletteColor]) -> Result<Option<RgbaImage>> {
    if colors.is_empty() {
        return Ok(None);
    }
    let blocks = u32::try_from(colors.len()).unwrap_or(u32::MAX);
    let block_width = SWATCH_WIDTH / blocks;
    if block_width == 0 {
        return Err(PaletteError::visualization(
            "swatch",
            format!("{blocks} colors do not fit in {SWATCH_WIDTH}px"),
        ));
    }

    let height = block_width * 4;
    let mut strip = RgbaImage::new(block_width * blocks, height);
    for (x, y, pixel) in strip.enumerate_pixels_mut() {
        if y < block_width {
            let index = (x / block_width) as usize;
            *pixel = Rgba(colors[index].color.to_rgba8());
        }
    }
    Ok(Some(strip))
}

/// Place `strip` to the right of `frame`
#[must_use]
pub fn compose(frame: &RgbaImage, strip: &RgbaImage) -> RgbaImage {
    let width = frame.width() + strip.width();
    let height = frame.height().max(strip.height());
    let mut canvas = RgbaImage::new(width, height);
    imageops::replace(&mut canvas, frame, 0, 0);
    imageops::replace(&mut canvas, strip, i64::from(frame.width()), 0);
    canvas
}

fn save(image: &RgbaImage, path: &Path) -> Result<()> {
    image
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| PaletteError::visualization(path, e))
}

fn remove(path: &Path) -> Result<()> {
    std::fs::remove_file(path).map_err(|e| PaletteError::visualization(path, e))
}
