//! Single-segment recording state machine.
//!
//! A segment moves `Idle -> Opening -> Recording -> Closing -> Done`, or to
//! `Failed` from any non-terminal state. While recording, every captured
//! frame is written by the device, run through the person detector, annotated
//! and shown on the preview. Detection never alters the stored footage.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, Instrument};

use daycam_media::{
    annotate, verify_segment, CaptureDevice, PersonDetector, PreviewSink, TranscodePipeline,
};
use daycam_models::{Segment, SegmentOutcome, SegmentState};

use crate::clock::Clock;
use crate::error::{RecorderError, RecorderResult};
use crate::logging::SegmentLogger;

/// Why a segment stopped recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Scheduled end reached
    Deadline,
    /// Stop key pressed on the preview
    Interactive,
    /// Process shutdown requested
    Shutdown,
    /// Capture device went away mid-segment
    DeviceLost,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Deadline => "deadline",
            StopReason::Interactive => "interactive",
            StopReason::Shutdown => "shutdown",
            StopReason::DeviceLost => "device_lost",
        }
    }
}

/// Result of one recorded segment.
#[derive(Debug, Clone)]
pub struct SegmentReport {
    pub segment: Segment,
    pub outcome: SegmentOutcome,
    pub stop: StopReason,
    pub final_state: SegmentState,
    /// Frames delivered by the device
    pub frames: u64,
    /// Polls where the device had no frame
    pub empty_frames: u64,
    /// Frames shown without detection because inference failed
    pub skipped_frames: u64,
    /// Person boxes drawn across all frames
    pub detections: u64,
}

/// Records one segment from open to conversion.
pub struct SegmentRecorder<'a> {
    device: &'a mut dyn CaptureDevice,
    detector: &'a mut PersonDetector,
    preview: &'a mut dyn PreviewSink,
    transcoder: &'a TranscodePipeline,
    clock: &'a dyn Clock,
    shutdown: watch::Receiver<bool>,
    frame_interval: Duration,
    segment: Segment,
    state: SegmentState,
    logger: SegmentLogger,
}

#[derive(Default)]
struct FrameCounters {
    frames: u64,
    empty_frames: u64,
    skipped_frames: u64,
    detections: u64,
}

impl<'a> SegmentRecorder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        segment: Segment,
        device: &'a mut dyn CaptureDevice,
        detector: &'a mut PersonDetector,
        preview: &'a mut dyn PreviewSink,
        transcoder: &'a TranscodePipeline,
        clock: &'a dyn Clock,
        shutdown: watch::Receiver<bool>,
        frame_interval: Duration,
    ) -> Self {
        let logger = SegmentLogger::new(&segment);
        Self {
            device,
            detector,
            preview,
            transcoder,
            clock,
            shutdown,
            frame_interval,
            segment,
            state: SegmentState::Idle,
            logger,
        }
    }

    /// Record until the scheduled end, a stop key or shutdown, then convert.
    ///
    /// Returns an error only when the segment could not be opened; every
    /// later failure is reported through [`SegmentReport::outcome`].
    pub async fn record(self) -> RecorderResult<SegmentReport> {
        let span = self.logger.create_span();
        self.run().instrument(span).await
    }

    async fn run(mut self) -> RecorderResult<SegmentReport> {
        self.transition(SegmentState::Opening);
        if let Err(e) = self.device.start_recording(&self.segment.raw_path).await {
            self.logger.log_error(&format!("failed to open: {e}"));
            self.transition(SegmentState::Failed);
            return Err(RecorderError::device_open("start_recording", e));
        }

        self.transition(SegmentState::Recording);
        self.logger.log_start(&format!(
            "recording until {}",
            self.segment.scheduled_end.format("%Y-%m-%d %H:%M:%S")
        ));

        let mut counters = FrameCounters::default();
        let stop = self.record_frames(&mut counters).await;

        self.transition(SegmentState::Closing);
        self.logger.log_progress(&format!(
            "stopped ({}) after {} frames, {} detections",
            stop.as_str(),
            counters.frames,
            counters.detections
        ));
        if let Err(e) = self.device.stop_recording().await {
            self.logger
                .log_warning(&format!("device did not stop cleanly: {e}"));
        }
        self.preview.close();

        let outcome = self.close().await;

        Ok(SegmentReport {
            segment: self.segment,
            outcome,
            stop,
            final_state: self.state,
            frames: counters.frames,
            empty_frames: counters.empty_frames,
            skipped_frames: counters.skipped_frames,
            detections: counters.detections,
        })
    }

    async fn record_frames(&mut self, counters: &mut FrameCounters) -> StopReason {
        loop {
            if *self.shutdown.borrow() {
                return StopReason::Shutdown;
            }
            if self.clock.now() >= self.segment.scheduled_end {
                return StopReason::Deadline;
            }

            let mut frame = match self.device.capture_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    counters.empty_frames += 1;
                    self.clock.sleep(self.frame_interval).await;
                    continue;
                }
                Err(e) if e.is_device_lost() => {
                    self.logger.log_error(&format!("capture device lost: {e}"));
                    return StopReason::DeviceLost;
                }
                Err(e) => {
                    counters.empty_frames += 1;
                    self.logger.log_warning(&format!("capture failed: {e}"));
                    self.clock.sleep(self.frame_interval).await;
                    continue;
                }
            };
            counters.frames += 1;

            // Inline inference paces the preview; the device keeps encoding meanwhile
            match self.detector.detect(&frame) {
                Ok(detections) => {
                    counters.detections += detections.len() as u64;
                    annotate(&mut frame, &detections);
                }
                Err(e) => {
                    counters.skipped_frames += 1;
                    self.logger.log_warning(&format!(
                        "detection skipped for frame {}: {e}",
                        counters.frames
                    ));
                }
            }

            if let Err(e) = self.preview.show(&frame) {
                self.logger.log_warning(&format!("preview failed: {e}"));
            }
            if self.preview.stop_requested() {
                return StopReason::Interactive;
            }
        }
    }

    /// Verify the raw stream and hand it to the transcoder.
    async fn close(&mut self) -> SegmentOutcome {
        let raw = self.segment.raw_path.clone();
        let bytes = match verify_segment(&raw).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.logger.log_error(&format!("{e}, nothing to convert"));
                self.transition(SegmentState::Failed);
                return SegmentOutcome::WriteFailed;
            }
        };
        debug!(segment = self.segment.index, bytes, "Raw stream written");

        self.transition(SegmentState::Done);

        match self
            .transcoder
            .finalize(&raw, &self.segment.converted_path)
            .await
        {
            Ok(()) => {
                self.logger.log_completion(&format!(
                    "converted to {}",
                    self.segment.converted_path.display()
                ));
                SegmentOutcome::Converted
            }
            Err(e) => {
                self.logger
                    .log_error(&format!("conversion failed, raw stream kept: {e}"));
                SegmentOutcome::ConversionFailed
            }
        }
    }

    fn transition(&mut self, next: SegmentState) {
        if !self.state.can_transition_to(next) {
            self.logger.log_warning(&format!(
                "unexpected transition {} -> {}",
                self.state.as_str(),
                next.as_str()
            ));
        }
        debug!(
            segment = self.segment.index,
            from = self.state.as_str(),
            to = next.as_str(),
            "Segment state changed"
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use daycam_media::detection::DecodeLayout;
    use daycam_media::transcode::Converter;
    use daycam_media::{
        DetectorConfig, Frame, HeadlessPreview, InferenceBackend, MediaError, MediaResult,
    };
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    /// Camera that advances the clock by `step` per captured frame.
    struct SteppingCamera {
        clock: Arc<ManualClock>,
        step: Duration,
        write_bytes: bool,
        fail_open: bool,
        frames_left: Option<u32>,
        /// Report the device lost once `frames_left` runs out
        lose_when_drained: bool,
        recording: Option<PathBuf>,
    }

    impl SteppingCamera {
        fn new(clock: Arc<ManualClock>) -> Self {
            Self {
                clock,
                step: Duration::from_secs(600),
                write_bytes: true,
                fail_open: false,
                frames_left: None,
                lose_when_drained: false,
                recording: None,
            }
        }
    }

    #[async_trait]
    impl CaptureDevice for SteppingCamera {
        async fn start(&mut self) -> MediaResult<()> {
            Ok(())
        }

        async fn stop(&mut self) -> MediaResult<()> {
            self.stop_recording().await
        }

        async fn capture_frame(&mut self) -> MediaResult<Option<Frame>> {
            if let Some(left) = self.frames_left.as_mut() {
                if *left == 0 {
                    if self.lose_when_drained {
                        return Err(MediaError::device_lost("capture process exited"));
                    }
                    return Ok(None);
                }
                *left -= 1;
            }
            self.clock.advance(self.step);
            Ok(Some(Frame::new(64, 48)))
        }

        async fn start_recording(&mut self, path: &Path) -> MediaResult<()> {
            if self.fail_open {
                return Err(MediaError::device_open("device busy"));
            }
            std::fs::File::create(path)?;
            self.recording = Some(path.to_path_buf());
            Ok(())
        }

        async fn stop_recording(&mut self) -> MediaResult<()> {
            if let Some(path) = self.recording.take() {
                if self.write_bytes {
                    std::fs::write(path, [0u8, 0, 0, 1, 0x67])?;
                }
            }
            Ok(())
        }
    }

    struct OnePerson;

    impl InferenceBackend for OnePerson {
        fn name(&self) -> &str {
            "one-person"
        }

        fn layout(&self) -> DecodeLayout {
            DecodeLayout::DARKNET
        }

        fn forward(&mut self, _frame: &Frame) -> MediaResult<Vec<Vec<f32>>> {
            Ok(vec![vec![0.5, 0.5, 0.25, 0.5, 0.9, 0.8, 0.1]])
        }
    }

    /// Fails inference on every other frame.
    struct FlakyBackend {
        calls: u32,
    }

    impl InferenceBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        fn layout(&self) -> DecodeLayout {
            DecodeLayout::DARKNET
        }

        fn forward(&mut self, _frame: &Frame) -> MediaResult<Vec<Vec<f32>>> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(MediaError::inference("forward pass failed"));
            }
            Ok(vec![vec![0.5, 0.5, 0.25, 0.5, 0.9, 0.8, 0.1]])
        }
    }

    struct CopyConverter;

    #[async_trait]
    impl Converter for CopyConverter {
        async fn convert(&self, raw: &Path, out: &Path) -> MediaResult<()> {
            tokio::fs::copy(raw, out).await?;
            Ok(())
        }
    }

    struct BrokenConverter;

    #[async_trait]
    impl Converter for BrokenConverter {
        async fn convert(&self, raw: &Path, _out: &Path) -> MediaResult<()> {
            Err(MediaError::Conversion {
                raw: raw.to_path_buf(),
                message: "invalid data".to_string(),
                exit_code: Some(1),
            })
        }
    }

    /// Requests a stop after `after` frames.
    struct StopAfter {
        after: u64,
        shown: u64,
    }

    impl PreviewSink for StopAfter {
        fn show(&mut self, _frame: &Frame) -> MediaResult<()> {
            self.shown += 1;
            Ok(())
        }

        fn stop_requested(&mut self) -> bool {
            self.shown >= self.after
        }

        fn close(&mut self) {}
    }

    fn detector() -> PersonDetector {
        PersonDetector::with_backend(Box::new(OnePerson), DetectorConfig::default())
    }

    async fn record(
        segment: Segment,
        camera: &mut SteppingCamera,
        preview: &mut dyn PreviewSink,
        transcoder: &TranscodePipeline,
        clock: &ManualClock,
    ) -> RecorderResult<SegmentReport> {
        record_with(detector(), segment, camera, preview, transcoder, clock).await
    }

    async fn record_with(
        mut detector: PersonDetector,
        segment: Segment,
        camera: &mut SteppingCamera,
        preview: &mut dyn PreviewSink,
        transcoder: &TranscodePipeline,
        clock: &ManualClock,
    ) -> RecorderResult<SegmentReport> {
        let (_tx, rx) = watch::channel(false);
        SegmentRecorder::new(
            segment,
            camera,
            &mut detector,
            preview,
            transcoder,
            clock,
            rx,
            Duration::from_millis(33),
        )
        .record()
        .await
    }

    #[tokio::test]
    async fn test_records_until_deadline_and_converts() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(16, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let segment = Segment::new(dir.path(), 0, at(17, 0));

        let report = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::Deadline);
        assert_eq!(report.outcome, SegmentOutcome::Converted);
        assert_eq!(report.final_state, SegmentState::Done);
        assert_eq!(report.frames, 6);
        assert_eq!(report.detections, 6);
        assert_eq!(preview.frames_shown(), 6);
        assert!(!report.segment.raw_path.exists());
        assert!(report.segment.converted_path.exists());
    }

    #[tokio::test]
    async fn test_stop_key_ends_segment_early() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        let mut preview = StopAfter { after: 2, shown: 0 };
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let segment = Segment::new(dir.path(), 1, at(11, 0));

        let report = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::Interactive);
        assert_eq!(report.frames, 2);
        assert_eq!(report.outcome, SegmentOutcome::Converted);
        assert_eq!(clock.now(), at(9, 20));
    }

    #[tokio::test]
    async fn test_missing_frames_wait_one_interval() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        camera.frames_left = Some(0);
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let segment = Segment::new(dir.path(), 0, at(9, 0) + chrono::Duration::seconds(1));

        let report = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap();

        assert_eq!(report.frames, 0);
        assert!(report.empty_frames >= 30);
        assert!(clock
            .sleeps()
            .iter()
            .all(|d| *d == Duration::from_millis(33)));
        assert_eq!(preview.frames_shown(), 0);
    }

    #[tokio::test]
    async fn test_detection_failure_still_shows_frame() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let detector = PersonDetector::with_backend(
            Box::new(FlakyBackend { calls: 0 }),
            DetectorConfig::default(),
        );
        let segment = Segment::new(dir.path(), 0, at(10, 0));

        let report = record_with(
            detector,
            segment,
            &mut camera,
            &mut preview,
            &transcoder,
            &clock,
        )
        .await
        .unwrap();

        assert_eq!(report.frames, 6);
        assert_eq!(report.skipped_frames, 3);
        assert_eq!(report.detections, 3);
        assert_eq!(preview.frames_shown(), 6);
        assert_eq!(report.outcome, SegmentOutcome::Converted);
    }

    #[tokio::test]
    async fn test_device_loss_ends_segment_and_keeps_footage() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        camera.frames_left = Some(2);
        camera.lose_when_drained = true;
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let segment = Segment::new(dir.path(), 0, at(11, 0));

        let report = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap();

        assert_eq!(report.stop, StopReason::DeviceLost);
        assert_eq!(report.frames, 2);
        assert_eq!(report.empty_frames, 0);
        // No polling against a dead device
        assert!(clock.sleeps().is_empty());
        assert_eq!(report.outcome, SegmentOutcome::Converted);
        assert!(report.segment.converted_path.exists());
    }

    #[tokio::test]
    async fn test_empty_raw_stream_is_write_failure() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        camera.write_bytes = false;
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let segment = Segment::new(dir.path(), 0, at(9, 30));

        let report = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap();

        assert_eq!(report.outcome, SegmentOutcome::WriteFailed);
        assert_eq!(report.final_state, SegmentState::Failed);
        assert!(!report.segment.converted_path.exists());
    }

    #[tokio::test]
    async fn test_conversion_failure_keeps_raw_stream() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(BrokenConverter));
        let segment = Segment::new(dir.path(), 0, at(9, 30));

        let report = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap();

        assert_eq!(report.outcome, SegmentOutcome::ConversionFailed);
        assert!(report.segment.raw_path.exists());
        assert!(!report.segment.converted_path.exists());
    }

    #[tokio::test]
    async fn test_open_failure_is_device_error() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        camera.fail_open = true;
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let segment = Segment::new(dir.path(), 0, at(9, 30));

        let err = record(segment, &mut camera, &mut preview, &transcoder, &clock)
            .await
            .unwrap_err();

        assert!(matches!(err, RecorderError::DeviceOpen { stage: "start_recording", .. }));
        assert_eq!(preview.frames_shown(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_frame() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0)));
        let mut camera = SteppingCamera::new(clock.clone());
        let mut preview = HeadlessPreview::new();
        let transcoder = TranscodePipeline::new(Box::new(CopyConverter));
        let mut detector = detector();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let report = SegmentRecorder::new(
            Segment::new(dir.path(), 0, at(11, 0)),
            &mut camera,
            &mut detector,
            &mut preview,
            &transcoder,
            &*clock,
            rx,
            Duration::from_millis(33),
        )
        .record()
        .await
        .unwrap();

        assert_eq!(report.stop, StopReason::Shutdown);
        assert_eq!(report.frames, 0);
        // Opened file was still flushed and converted
        assert_eq!(report.outcome, SegmentOutcome::Converted);
    }
}
