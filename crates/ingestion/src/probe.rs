//! Media metadata probing through `ffprobe`

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};
use video_palette_common::{MediaInfo, PaletteError, Result};

/// Upper bound on a single metadata probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

/// Probe duration, frame rate and dimensions of the first video stream.
///
/// The `ffprobe` process is killed if it runs longer than `timeout`.
pub async fn probe_media(path: &Path, timeout: Duration) -> Result<MediaInfo> {
    debug!("Probing media file: {}", path.display());

    let mut command = Command::new("ffprobe");
    command
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .kill_on_drop(true);

    let output = output_within(command, path, timeout).await?;

    if !output.status.success() {
        return Err(PaletteError::media_open(
            path,
            format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }

    let info = parse_probe_output(&output.stdout, path)?;
    info!(
        "Probed {}: duration={}ms fps={:.3} size={}x{}",
        path.display(),
        info.duration_ms,
        info.fps,
        info.width,
        info.height
    );
    Ok(info)
}

/// Run `command` to completion, killing it once `timeout` expires
async fn output_within(
    mut command: Command,
    path: &Path,
    timeout: Duration,
) -> Result<std::process::Output> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| PaletteError::Timeout {
            operation: format!("{program} {}", path.display()),
            secs: timeout.as_secs(),
        })?
        .map_err(|e| PaletteError::media_open(path, format!("failed to execute {program}: {e}")))
}

/// Build [`MediaInfo`] from `ffprobe -print_format json` output
pub fn parse_probe_output(json: &[u8], path: &Path) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| PaletteError::media_open(path, format!("invalid ffprobe output: {e}")))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PaletteError::media_open(path, "no video stream found"))?;

    let duration_secs = probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| PaletteError::media_open(path, "media duration unknown"))?;

    Ok(MediaInfo {
        duration_ms: (duration_secs * 1000.0) as u64,
        fps: video.r_frame_rate.as_deref().map_or(0.0, parse_frame_rate),
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        codec: video.codec_name.clone(),
    })
}

/// Parse a frame rate written as a fraction (`30000/1001`) or a plain number.
///
/// Unparseable input and a zero denominator yield `0.0`.
#[must_use]
pub fn parse_frame_rate(rate: &str) -> f64 {
    let rate = rate.trim();
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().unwrap_or(0.0);
            let den = den.trim().parse::<f64>().unwrap_or(0.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.parse::<f64>().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "h264",
             "width": 1920, "height": 1080, "r_frame_rate": "30000/1001"}
        ],
        "format": {"filename": "clip.mp4", "duration": "5.000000", "size": "1234"}
    }"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stalled_command_times_out() {
        let mut command = Command::new("sleep");
        command.arg("30").kill_on_drop(true);
        let timeout = Duration::from_millis(100);
        let result = output_within(command, Path::new("clip.mp4"), timeout).await;
        assert!(matches!(result, Err(PaletteError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_media_open_error() {
        let command = Command::new("/nonexistent/ffprobe");
        let result = output_within(command, Path::new("clip.mp4"), PROBE_TIMEOUT).await;
        assert!(matches!(result, Err(PaletteError::MediaOpenError { .. })));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert!((parse_frame_rate("30000/1001") - 29.97).abs() < 0.001);
        assert_eq!(parse_frame_rate("25"), 25.0);
        assert_eq!(parse_frame_rate("0/0"), 0.0);
        assert_eq!(parse_frame_rate("garbage"), 0.0);
    }

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(SAMPLE.as_bytes(), Path::new("clip.mp4")).unwrap();
        assert_eq!(info.duration_ms, 5000);
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
        assert_eq!(info.codec.as_deref(), Some("h264"));
        assert!((info.fps - 29.97).abs() < 0.001);
    }

    #[test]
    fn test_parse_probe_output_without_video() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        assert!(matches!(
            parse_probe_output(json.as_bytes(), Path::new("audio.m4a")),
            Err(PaletteError::MediaOpenError { .. })
        ));
    }

    #[test]
    fn test_parse_probe_output_without_duration() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2}], "format": {}}"#;
        assert!(matches!(
            parse_probe_output(json.as_bytes(), Path::new("stream.ts")),
            Err(PaletteError::MediaOpenError { .. })
        ));
    }

    #[test]
    fn test_parse_probe_output_rejects_garbage() {
        assert!(matches!(
            parse_probe_output(b"not json", Path::new("x.mp4")),
            Err(PaletteError::MediaOpenError { .. })
        ));
    }

    #[tokio::test]
    #[ignore] // Requires ffprobe on PATH
    async fn test_probe_missing_file() {
        let result = probe_media(Path::new("/nonexistent/video.mp4"), PROBE_TIMEOUT).await;
        assert!(result.is_err());
    }
}
