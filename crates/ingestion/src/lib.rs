//! Media ingestion: metadata probing and seekable frame access
//!
//! Both go through the `ffmpeg`/`ffprobe` command-line tools, so no native
//! libav libraries are needed at build time.

pub mod media;
pub mod probe;

pub use media::{FfmpegMediaSource, MediaSource};
pub use probe::{parse_frame_rate, parse_probe_output, probe_media, PROBE_TIMEOUT};
