//! Seekable frame access

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;
use video_palette_common::{MediaInfo, PaletteError, Result};

use crate::probe::probe_media;

/// Frame step used when the stream reports no frame rate
const FALLBACK_FRAME_MS: f64 = 40.0;

/// Seekable source of decoded frames.
///
/// Seek and read are stateful; one handle must not be shared between threads.
pub trait MediaSource: Send {
    /// Probed properties of the media
    fn info(&self) -> &MediaInfo;

    /// Position the read cursor at `offset_ms`
    fn seek(&mut self, offset_ms: u64) -> Result<()>;

    /// Decode the frame at the cursor and advance past it.
    ///
    /// `Ok(None)` signals end of stream.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// [`MediaSource`] that decodes single frames with the `ffmpeg` CLI
#[derive(Debug, Clone)]
pub struct FfmpegMediaSource {
    path: PathBuf,
    info: MediaInfo,
    position_ms: f64,
}

impl FfmpegMediaSource {
    /// Probe `path` and open it for frame reads
    pub async fn open(path: &Path, probe_timeout: Duration) -> Result<Self> {
        let info = probe_media(path, probe_timeout).await?;
        Self::with_info(path, info)
    }

    /// Open with already-probed metadata
    pub fn with_info(path: &Path, info: MediaInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(PaletteError::media_open(path, "video stream has no dimensions"));
        }
        Ok(Self {
            path: path.to_path_buf(),
            info,
            position_ms: 0.0,
        })
    }

    fn frame_step_ms(&self) -> f64 {
        if self.info.fps > 0.0 {
            1000.0 / self.info.fps
        } else {
            FALLBACK_FRAME_MS
        }
    }
}

impl MediaSource for FfmpegMediaSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn seek(&mut self, offset_ms: u64) -> Result<()> {
        self.position_ms = offset_ms as f64;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let seek_secs = format!("{:.3}", self.position_ms / 1000.0);
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-noautorotate", "-ss", &seek_secs, "-i"])
            .arg(&self.path)
            .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .output()
            .map_err(|e| {
                PaletteError::media_open(&self.path, format!("failed to execute ffmpeg: {e}"))
            })?;

        if !output.status.success() {
            return Err(PaletteError::media_open(
                &self.path,
                format!(
                    "ffmpeg failed at {}s: {}",
                    seek_secs,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        if output.stdout.is_empty() {
            debug!("End of stream at {}ms", self.position_ms);
            return Ok(None);
        }

        let (width, height) = (self.info.width, self.info.height);
        let expected = width as usize * height as usize * 3;
        if output.stdout.len() != expected {
            return Err(PaletteError::media_open(
                &self.path,
                format!(
                    "decoded frame has {} bytes, expected {} for {}x{}",
                    output.stdout.len(),
                    expected,
                    width,
                    height
                ),
            ));
        }

        self.position_ms += self.frame_step_ms();
        RgbImage::from_raw(width, height, output.stdout)
            .map(Some)
            .ok_or_else(|| PaletteError::media_open(&self.path, "invalid RGB24 frame data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32, fps: f64) -> MediaInfo {
        MediaInfo {
            duration_ms: 1000,
            fps,
            width,
            height,
            codec: None,
        }
    }

    #[test]
    fn test_with_info_requires_dimensions() {
        assert!(matches!(
            FfmpegMediaSource::with_info(Path::new("x.mp4"), info(0, 0, 30.0)),
            Err(PaletteError::MediaOpenError { .. })
        ));
    }

    #[test]
    fn test_frame_step() {
        let source = FfmpegMediaSource::with_info(Path::new("x.mp4"), info(4, 4, 25.0)).unwrap();
        assert_eq!(source.frame_step_ms(), 40.0);
        let source = FfmpegMediaSource::with_info(Path::new("x.mp4"), info(4, 4, 0.0)).unwrap();
        assert_eq!(source.frame_step_ms(), FALLBACK_FRAME_MS);
    }

    #[test]
    fn test_seek_sets_position() {
        let mut source =
            FfmpegMediaSource::with_info(Path::new("x.mp4"), info(4, 4, 30.0)).unwrap();
        source.seek(2000).unwrap();
        assert_eq!(source.position_ms, 2000.0);
        assert_eq!(source.info().width, 4);
    }

    #[test]
    #[ignore] // Requires ffmpeg on PATH
    fn test_read_frame_missing_file() {
        let mut source =
            FfmpegMediaSource::with_info(Path::new("/nonexistent.mp4"), info(4, 4, 30.0)).unwrap();
        assert!(source.read_frame().is_err());
    }
}
