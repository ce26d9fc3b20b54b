//! Timeline walk over the media
//!
//! Offsets `0, s, 2s, ...` up to and including the media duration are visited
//! in order. At each one the source is positioned, frames are read until a
//! non-empty one shows up, and that frame is downscaled, handed to the
//! extractor and its palette streamed to the aggregator. Offsets where the
//! source has nothing left are skipped without consuming a segment number.
//!
//! The walk position is carried in an explicit [`SchedulerState`] value so a
//! caller can drive it one step at a time.

use image::RgbImage;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;
use video_palette_common::{ExtractionVariant, Result};
use video_palette_extraction::{downscale, extract_checked, PaletteExtractor, DOWNSCALE_FACTOR};
use video_palette_ingestion::MediaSource;

use crate::aggregator::ResultAggregator;
use crate::context::RunContext;
use crate::visualize::Visualizer;

/// One time window of the source that produced a palette
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// 1-based, consecutive over emitted segments
    pub index: u32,
    pub start_offset_ms: u64,
    pub duration_seconds: f64,
    pub sample_id: Uuid,
    pub frame_available: bool,
}

/// Where the walk stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Next offset to visit
    Seeking(u64),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub phase: Phase,
    /// Segments emitted so far
    pub emitted: u32,
    /// Offsets visited so far, empty ones included
    pub steps: u32,
}

impl SchedulerState {
    #[must_use]
    pub const fn initial() -> Self {
        Self {
            phase: Phase::Seeking(0),
            emitted: 0,
            steps: 0,
        }
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::initial()
    }
}

/// Result of a single step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The source had no frame at this offset
    Empty { offset_ms: u64 },
    Emitted { segment: Segment, rows: usize },
    Done,
}

/// Drives a media source through the extractor into an aggregator
pub struct SegmentScheduler<'a> {
    media: &'a mut dyn MediaSource,
    extractor: &'a dyn PaletteExtractor,
    visualizer: Option<&'a Visualizer>,
    palette_size: u32,
    variant: ExtractionVariant,
    step_ms: u64,
    segment_duration_seconds: f64,
    downscale_factor: f64,
}

impl<'a> SegmentScheduler<'a> {
    pub fn new(
        media: &'a mut dyn MediaSource,
        extractor: &'a dyn PaletteExtractor,
        ctx: &RunContext,
    ) -> Self {
        Self {
            media,
            extractor,
            visualizer: None,
            palette_size: ctx.palette_size,
            variant: ctx.variant,
            step_ms: ctx.step_ms().max(1),
            segment_duration_seconds: ctx.segment_duration_seconds,
            downscale_factor: DOWNSCALE_FACTOR,
        }
    }

    #[must_use]
    pub fn with_visualizer(mut self, visualizer: Option<&'a Visualizer>) -> Self {
        self.visualizer = visualizer;
        self
    }

    #[must_use]
    pub fn with_downscale_factor(mut self, factor: f64) -> Self {
        self.downscale_factor = factor;
        self
    }

    /// Visit the offset named by `state` and return the state after it.
    ///
    /// Any error ends the walk; rows already handed to `sink` stay there.
    pub fn step<W: Write>(
        &mut self,
        state: SchedulerState,
        sink: &mut ResultAggregator<W>,
    ) -> Result<(SchedulerState, StepOutcome)> {
        let Phase::Seeking(offset_ms) = state.phase else {
            return Ok((state, StepOutcome::Done));
        };
        if offset_ms > self.media.info().duration_ms {
            let done = SchedulerState {
                phase: Phase::Done,
                ..state
            };
            return Ok((done, StepOutcome::Done));
        }

        let started = Instant::now();
        self.media.seek(offset_ms)?;
        let next = SchedulerState {
            phase: offset_ms
                .checked_add(self.step_ms)
                .map_or(Phase::Done, Phase::Seeking),
            emitted: state.emitted,
            steps: state.steps + 1,
        };

        let Some(frame) = self.next_frame()? else {
            debug!("No frame at {}ms, skipping", offset_ms);
            return Ok((next, StepOutcome::Empty { offset_ms }));
        };

        let scaled = downscale(&frame, self.downscale_factor);
        let colors = extract_checked(self.extractor, &scaled, self.palette_size, self.variant)?;

        let segment = Segment {
            index: state.emitted + 1,
            start_offset_ms: offset_ms,
            duration_seconds: self.segment_duration_seconds,
            sample_id: Uuid::new_v4(),
            frame_available: true,
        };
        let palette_id = Uuid::new_v4();

        if let Some(visualizer) = self.visualizer {
            visualizer.render(next.steps, segment.index, &frame, &colors)?;
        }
        let rows = sink.flush_segment(&segment, palette_id, &colors)?;
        info!(
            "Segment {} at {}ms: {} colors in {:.2}s",
            segment.index,
            offset_ms,
            rows,
            started.elapsed().as_secs_f64()
        );

        Ok((
            SchedulerState {
                emitted: segment.index,
                ..next
            },
            StepOutcome::Emitted { segment, rows },
        ))
    }

    /// Walk the whole timeline from the start
    pub fn run<W: Write>(&mut self, sink: &mut ResultAggregator<W>) -> Result<SchedulerState> {
        let mut state = SchedulerState::initial();
        loop {
            let (next, outcome) = self.step(state, sink)?;
            if outcome == StepOutcome::Done {
                return Ok(next);
            }
            state = next;
        }
    }

    // Empty frames are skipped; end of stream yields None
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        loop {
            match self.media.read_frame()? {
                None => return Ok(None),
                Some(frame) if frame.width() == 0 || frame.height() == 0 => continue,
                Some(frame) => return Ok(Some(frame)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SourceMeta;
    use crate::context::RunRequest;
    use image::Rgb;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use video_palette_common::{MediaInfo, PaletteColor, PaletteError, Rgba16};

    /// Frames keyed by seek offset; missing offsets read as end of stream
    struct ScriptedMedia {
        info: MediaInfo,
        frames: HashMap<u64, Vec<RgbImage>>,
        cursor: Vec<RgbImage>,
        seeks: Vec<u64>,
    }

    impl ScriptedMedia {
        fn new(duration_ms: u64) -> Self {
            Self {
                info: MediaInfo {
                    duration_ms,
                    fps: 25.0,
                    width: 20,
                    height: 20,
                    codec: None,
                },
                frames: HashMap::new(),
                cursor: Vec::new(),
                seeks: Vec::new(),
            }
        }

        fn with_frames(mut self, offset_ms: u64, frames: Vec<RgbImage>) -> Self {
            self.frames.insert(offset_ms, frames);
            self
        }
    }

    impl MediaSource for ScriptedMedia {
        fn info(&self) -> &MediaInfo {
            &self.info
        }

        fn seek(&mut self, offset_ms: u64) -> Result<()> {
            self.seeks.push(offset_ms);
            self.cursor = self.frames.get(&offset_ms).cloned().unwrap_or_default();
            self.cursor.reverse();
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<RgbImage>> {
            Ok(self.cursor.pop())
        }
    }

    /// Returns the mean frame color `k` times and records image sizes
    #[derive(Default)]
    struct MeanExtractor {
        sizes: Mutex<Vec<(u32, u32)>>,
        fail: bool,
    }

    impl PaletteExtractor for MeanExtractor {
        fn extract(
            &self,
            image: &RgbImage,
            k: u32,
            _: ExtractionVariant,
        ) -> Result<Vec<PaletteColor>> {
            if self.fail {
                return Err(PaletteError::ExtractionError("boom".to_string()));
            }
            self.sizes.lock().unwrap().push(image.dimensions());
            let Rgb([r, g, b]) = *image.get_pixel(0, 0);
            Ok((0..k)
                .map(|_| PaletteColor::new(Rgba16::from_rgba8(r, g, b, 255), None))
                .collect())
        }
    }

    fn frame(v: u8) -> RgbImage {
        RgbImage::from_pixel(20, 20, Rgb([v, v, v]))
    }

    fn ctx(period_seconds: f64, k: u32) -> RunContext {
        RunContext::from_request(&RunRequest {
            source_url: "/tmp/clip.mp4".to_string(),
            source_serial: "S".to_string(),
            period_seconds,
            palette_size: k,
            function_type: 0,
            destination_uri: String::new(),
            visualize_output_folder: None,
        })
        .unwrap()
    }

    fn aggregator() -> ResultAggregator<Vec<u8>> {
        ResultAggregator::new(
            Vec::new(),
            "memory",
            SourceMeta {
                serial: "S".to_string(),
                url: "/tmp/clip.mp4".to_string(),
                duration_seconds: 5.0,
                fps: 25.0,
            },
            false,
        )
    }

    #[test]
    fn test_offsets_visited_through_duration() {
        let mut media = ScriptedMedia::new(5000)
            .with_frames(0, vec![frame(10)])
            .with_frames(2000, vec![frame(20)])
            .with_frames(4000, vec![frame(30)]);
        let extractor = MeanExtractor::default();
        let ctx = ctx(2.0, 3);
        let mut sink = aggregator();

        let state = SegmentScheduler::new(&mut media, &extractor, &ctx)
            .run(&mut sink)
            .unwrap();

        assert_eq!(media.seeks, vec![0, 2000, 4000]);
        assert_eq!(state.emitted, 3);
        assert_eq!(state.steps, 3);
        assert!(state.is_done());
        assert_eq!(sink.rows_written(), 9);
    }

    #[test]
    fn test_offset_equal_to_duration_is_visited() {
        let mut media = ScriptedMedia::new(4000)
            .with_frames(0, vec![frame(1)])
            .with_frames(2000, vec![frame(2)])
            .with_frames(4000, vec![frame(3)]);
        let extractor = MeanExtractor::default();
        let ctx = ctx(2.0, 1);
        let mut sink = aggregator();

        SegmentScheduler::new(&mut media, &extractor, &ctx)
            .run(&mut sink)
            .unwrap();
        assert_eq!(media.seeks, vec![0, 2000, 4000]);
    }

    #[test]
    fn test_empty_offsets_do_not_consume_numbers() {
        let mut media = ScriptedMedia::new(4000)
            .with_frames(2000, vec![frame(5)])
            .with_frames(4000, vec![frame(6)]);
        let extractor = MeanExtractor::default();
        let ctx = ctx(2.0, 2);
        let mut sink = aggregator();
        let mut scheduler = SegmentScheduler::new(&mut media, &extractor, &ctx);

        let (state, outcome) = scheduler.step(SchedulerState::initial(), &mut sink).unwrap();
        assert_eq!(outcome, StepOutcome::Empty { offset_ms: 0 });
        assert_eq!(state.emitted, 0);
        assert_eq!(state.phase, Phase::Seeking(2000));

        let (state, outcome) = scheduler.step(state, &mut sink).unwrap();
        match outcome {
            StepOutcome::Emitted { segment, rows } => {
                assert_eq!(segment.index, 1);
                assert_eq!(segment.start_offset_ms, 2000);
                assert_eq!(rows, 2);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(state.emitted, 1);
        assert_eq!(state.steps, 2);
    }

    #[test]
    fn test_empty_frames_are_read_past() {
        let mut media = ScriptedMedia::new(0).with_frames(0, vec![RgbImage::new(0, 0), frame(7)]);
        let extractor = MeanExtractor::default();
        let ctx = ctx(1.0, 1);
        let mut sink = aggregator();

        let state = SegmentScheduler::new(&mut media, &extractor, &ctx)
            .run(&mut sink)
            .unwrap();
        assert_eq!(state.emitted, 1);
    }

    #[test]
    fn test_frames_are_downscaled() {
        let mut media = ScriptedMedia::new(0).with_frames(0, vec![frame(9)]);
        let extractor = MeanExtractor::default();
        let ctx = ctx(1.0, 1);
        let mut sink = aggregator();

        SegmentScheduler::new(&mut media, &extractor, &ctx)
            .run(&mut sink)
            .unwrap();
        assert_eq!(*extractor.sizes.lock().unwrap(), vec![(2, 2)]);
    }

    #[test]
    fn test_segment_ids_are_fresh() {
        let mut media = ScriptedMedia::new(1000)
            .with_frames(0, vec![frame(1)])
            .with_frames(1000, vec![frame(1)]);
        let extractor = MeanExtractor::default();
        let ctx = ctx(1.0, 1);
        let mut sink = aggregator();
        let mut scheduler = SegmentScheduler::new(&mut media, &extractor, &ctx);

        let (state, first) = scheduler.step(SchedulerState::initial(), &mut sink).unwrap();
        let (_, second) = scheduler.step(state, &mut sink).unwrap();
        let (StepOutcome::Emitted { segment: a, .. }, StepOutcome::Emitted { segment: b, .. }) =
            (first, second)
        else {
            panic!("both steps should emit");
        };
        assert_ne!(a.sample_id, b.sample_id);
    }

    #[test]
    fn test_extraction_failure_stops_walk() {
        let mut media = ScriptedMedia::new(2000).with_frames(0, vec![frame(1)]);
        let extractor = MeanExtractor {
            fail: true,
            ..Default::default()
        };
        let ctx = ctx(1.0, 1);
        let mut sink = aggregator();

        let result = SegmentScheduler::new(&mut media, &extractor, &ctx).run(&mut sink);
        assert!(matches!(result, Err(PaletteError::ExtractionError(_))));
        assert_eq!(media.seeks, vec![0]);
        assert!(!sink.header_written());
    }

    #[test]
    fn test_done_state_is_terminal() {
        let mut media = ScriptedMedia::new(0);
        let extractor = MeanExtractor::default();
        let ctx = ctx(1.0, 1);
        let mut sink = aggregator();
        let mut scheduler = SegmentScheduler::new(&mut media, &extractor, &ctx);

        let done = SchedulerState {
            phase: Phase::Done,
            emitted: 4,
            steps: 9,
        };
        assert_eq!(
            scheduler.step(done, &mut sink).unwrap(),
            (done, StepOutcome::Done)
        );
    }
}
