//! Palette extraction adapter
//!
//! Clustering itself is an external capability. This crate defines the
//! contract the pipeline relies on, the frame downscaling applied before
//! extraction, and a command-backed adapter.
//!
//! Contract:
//! - `k >= 1`
//! - at most `k` colors come back
//! - colors are 16 bits per channel
//! - weights may be absent, depending on the variant

pub mod command;

use image::{imageops::FilterType, RgbImage};
use video_palette_common::{ExtractionVariant, PaletteColor, PaletteError, Result};

pub use command::CommandPaletteExtractor;

/// Linear scale applied to a frame before extraction
pub const DOWNSCALE_FACTOR: f64 = 0.1;

/// External palette extraction capability
pub trait PaletteExtractor: Send + Sync {
    /// Extract up to `k` dominant colors from `image`
    fn extract(
        &self,
        image: &RgbImage,
        k: u32,
        variant: ExtractionVariant,
    ) -> Result<Vec<PaletteColor>>;
}

impl<T: PaletteExtractor + ?Sized> PaletteExtractor for std::sync::Arc<T> {
    fn extract(
        &self,
        image: &RgbImage,
        k: u32,
        variant: ExtractionVariant,
    ) -> Result<Vec<PaletteColor>> {
        (**self).extract(image, k, variant)
    }
}

/// Run `extractor` and enforce the adapter contract on its output
pub fn extract_checked(
    extractor: &dyn PaletteExtractor,
    image: &RgbImage,
    k: u32,
    variant: ExtractionVariant,
) -> Result<Vec<PaletteColor>> {
    if k == 0 {
        return Err(PaletteError::ExtractionError(
            "palette size must be at least 1".to_string(),
        ));
    }

    let colors = extractor.extract(image, k, variant)?;
    if colors.len() > k as usize {
        return Err(PaletteError::ExtractionError(format!(
            "extractor returned {} colors for palette size {}",
            colors.len(),
            k
        )));
    }
    Ok(colors)
}

/// Scale a frame by `factor` in both dimensions.
///
/// Triangle filtering only blends neighbouring pixels, so no color outside
/// the source gamut is introduced. Each side is at least one pixel.
#[must_use]
pub fn downscale(frame: &RgbImage, factor: f64) -> RgbImage {
    let width = scaled_side(frame.width(), factor);
    let height = scaled_side(frame.height(), factor);
    if (width, height) == frame.dimensions() {
        return frame.clone();
    }
    image::imageops::resize(frame, width, height, FilterType::Triangle)
}

fn scaled_side(side: u32, factor: f64) -> u32 {
    ((f64::from(side) * factor).round() as u32).max(1)
}
