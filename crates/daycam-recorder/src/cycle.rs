//! One day's recording run.
//!
//! A run prepares the output directory, loads the detector and starts the
//! camera, then records back-to-back segments until the window closes.
//! Segment indices restart at 0 for every run.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use daycam_media::{
    CaptureDevice, DetectorConfig, MediaError, MediaResult, PersonDetector, PreviewSink,
    TranscodePipeline,
};
use daycam_models::{RecordingWindow, Segment, SegmentOutcome};

use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::error::{RecorderError, RecorderResult};
use crate::recorder::{SegmentRecorder, SegmentReport, StopReason};

/// Builds the person detector at the start of each run.
pub type DetectorLoader = Box<dyn Fn(&DetectorConfig) -> MediaResult<PersonDetector> + Send + Sync>;

/// Segments produced by one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub segments: Vec<SegmentReport>,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn converted(&self) -> usize {
        self.count(SegmentOutcome::Converted)
    }

    pub fn count(&self, outcome: SegmentOutcome) -> usize {
        self.segments.iter().filter(|s| s.outcome == outcome).count()
    }
}

/// Something the scheduler can start inside the recording window.
#[async_trait]
pub trait RecordingRun: Send {
    async fn run(&mut self, window: &RecordingWindow) -> RecorderResult<RunSummary>;
}

/// Segment loop over a real or fake capture stack.
pub struct RecordingCycle {
    config: RecorderConfig,
    device: Box<dyn CaptureDevice>,
    preview: Box<dyn PreviewSink>,
    transcoder: TranscodePipeline,
    load_detector: DetectorLoader,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
}

impl RecordingCycle {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RecorderConfig,
        device: Box<dyn CaptureDevice>,
        preview: Box<dyn PreviewSink>,
        transcoder: TranscodePipeline,
        load_detector: DetectorLoader,
        clock: Arc<dyn Clock>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            device,
            preview,
            transcoder,
            load_detector,
            clock,
            shutdown,
        }
    }

    /// Loader backed by [`PersonDetector::load`].
    pub fn model_loader() -> DetectorLoader {
        Box::new(|config| PersonDetector::load(config.clone()))
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn prepare(&mut self) -> RecorderResult<PersonDetector> {
        let dir = &self.config.output_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| RecorderError::OutputDir {
                path: dir.clone(),
                source,
            })?;

        // No recording without a working detector
        let detector =
            (self.load_detector)(&self.config.detector).map_err(RecorderError::ModelLoad)?;

        self.device
            .start()
            .await
            .map_err(|e| RecorderError::device_open("start", e))?;

        Ok(detector)
    }

    async fn record_segments(
        &mut self,
        window: &RecordingWindow,
        detector: &mut PersonDetector,
        summary: &mut RunSummary,
    ) -> RecorderResult<()> {
        let frame_interval = self.config.frame_interval();
        let mut index = 0u32;

        loop {
            let now = self.clock.now();
            if window.has_closed(now) || self.shutdown_requested() {
                return Ok(());
            }

            let scheduled_end = window.segment_deadline(now, self.config.max_segment_duration);
            let segment = Segment::with_extensions(
                &self.config.output_dir,
                index,
                scheduled_end,
                &self.config.raw_extension,
                &self.config.container_extension,
            );

            let report = SegmentRecorder::new(
                segment,
                self.device.as_mut(),
                detector,
                self.preview.as_mut(),
                &self.transcoder,
                self.clock.as_ref(),
                self.shutdown.clone(),
                frame_interval,
            )
            .record()
            .await?;

            let stop = report.stop;
            summary.segments.push(report);
            index += 1;

            match stop {
                StopReason::Shutdown => return Ok(()),
                // The finished segment is already converted; the next run restarts the camera
                StopReason::DeviceLost => {
                    return Err(RecorderError::device_open(
                        "capture",
                        MediaError::device_lost(format!("lost during segment {}", index - 1)),
                    ))
                }
                StopReason::Deadline | StopReason::Interactive => {}
            }
        }
    }
}

#[async_trait]
impl RecordingRun for RecordingCycle {
    async fn run(&mut self, window: &RecordingWindow) -> RecorderResult<RunSummary> {
        let mut summary = RunSummary::default();
        if window.has_closed(self.clock.now()) || self.shutdown_requested() {
            return Ok(summary);
        }

        let mut detector = self.prepare().await?;
        info!(
            window = %window,
            output_dir = %self.config.output_dir.display(),
            "Recording run started"
        );

        let result = self
            .record_segments(window, &mut detector, &mut summary)
            .await;

        if let Err(e) = self.device.stop().await {
            warn!("Failed to stop capture device: {}", e);
        }

        match result {
            Ok(()) => {
                info!(
                    segments = summary.segments.len(),
                    converted = summary.converted(),
                    conversion_failed = summary.count(SegmentOutcome::ConversionFailed),
                    write_failed = summary.count(SegmentOutcome::WriteFailed),
                    "Recording run finished"
                );
                Ok(summary)
            }
            Err(e) => {
                warn!(
                    stage = e.stage(),
                    segments = summary.segments.len(),
                    "Recording run aborted: {}", e
                );
                Err(e)
            }
        }
    }
}
