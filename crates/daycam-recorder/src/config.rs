//! Recorder configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use daycam_media::{CameraConfig, DetectorConfig, ModelBackend};
use daycam_models::{RecordingWindow, CONTAINER_EXTENSION, RAW_EXTENSION};

use crate::error::{RecorderError, RecorderResult};

/// Where annotated frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewMode {
    /// On-screen window (needs the `opencv` feature)
    #[default]
    Window,
    /// No display
    Headless,
}

impl FromStr for PreviewMode {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "window" => Ok(PreviewMode::Window),
            "headless" | "none" => Ok(PreviewMode::Headless),
            other => Err(RecorderError::config(format!("unknown preview mode '{other}'"))),
        }
    }
}

/// Recorder configuration.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory holding raw and converted segments
    pub output_dir: PathBuf,
    /// Daily recording window
    pub window: RecordingWindow,
    /// Upper bound on a single segment's duration
    pub max_segment_duration: Duration,
    /// Delay between scheduler polls
    pub poll_interval: Duration,
    /// Upper bound on one container conversion
    pub conversion_timeout: Duration,
    pub raw_extension: String,
    pub container_extension: String,
    pub preview: PreviewMode,
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("videos"),
            window: RecordingWindow::default(),
            max_segment_duration: Duration::from_secs(2 * 3600), // 2 hours
            poll_interval: Duration::from_secs(60),
            conversion_timeout: Duration::from_secs(1800),
            raw_extension: RAW_EXTENSION.to_string(),
            container_extension: CONTAINER_EXTENSION.to_string(),
            preview: PreviewMode::Window,
            camera: CameraConfig::default(),
            detector: DetectorConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable values fall back to their defaults, as do zero sizes, rates
    /// and durations. A window whose start is not before its end is rejected.
    pub fn from_env() -> RecorderResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> RecorderResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let window = match (parse("DAYCAM_WINDOW_START"), parse("DAYCAM_WINDOW_END")) {
            (None, None) => defaults.window,
            (start, end) => {
                let default_start = defaults.window.start().format("%H:%M").to_string();
                let default_end = defaults.window.end().format("%H:%M").to_string();
                RecordingWindow::parse(
                    &start.unwrap_or(default_start),
                    &end.unwrap_or(default_end),
                )
                .map_err(|e| RecorderError::config(e.to_string()))?
            }
        };

        let camera = CameraConfig {
            device: parse("DAYCAM_DEVICE").unwrap_or(defaults.camera.device),
            input_format: parse("DAYCAM_INPUT_FORMAT").unwrap_or(defaults.camera.input_format),
            width: parse_nonzero_or(&lookup, "DAYCAM_FRAME_WIDTH", defaults.camera.width),
            height: parse_nonzero_or(&lookup, "DAYCAM_FRAME_HEIGHT", defaults.camera.height),
            fps: parse_nonzero_or(&lookup, "DAYCAM_FPS", defaults.camera.fps),
            bitrate: parse_nonzero_or(&lookup, "DAYCAM_BITRATE", defaults.camera.bitrate),
            encoder: parse("DAYCAM_ENCODER").unwrap_or(defaults.camera.encoder),
        };

        let detector = DetectorConfig {
            weights_path: parse("DAYCAM_WEIGHTS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.detector.weights_path),
            topology_path: parse("DAYCAM_TOPOLOGY_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.detector.topology_path),
            backend: parse_or::<ModelBackend, _>(
                &lookup,
                "DAYCAM_MODEL_BACKEND",
                defaults.detector.backend,
            ),
            confidence_threshold: parse_or(
                &lookup,
                "DAYCAM_CONFIDENCE",
                defaults.detector.confidence_threshold,
            ),
            nms_threshold: parse_or(&lookup, "DAYCAM_NMS_IOU", defaults.detector.nms_threshold),
            person_class: parse_or(&lookup, "DAYCAM_PERSON_CLASS", defaults.detector.person_class),
            input_size: parse_nonzero_or(
                &lookup,
                "DAYCAM_INPUT_SIZE",
                defaults.detector.input_size,
            ),
        };

        Ok(Self {
            output_dir: parse("DAYCAM_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            window,
            max_segment_duration: Duration::from_secs(parse_nonzero_or(
                &lookup,
                "DAYCAM_MAX_SEGMENT_SECS",
                defaults.max_segment_duration.as_secs(),
            )),
            poll_interval: Duration::from_secs(parse_nonzero_or(
                &lookup,
                "DAYCAM_POLL_SECS",
                defaults.poll_interval.as_secs(),
            )),
            conversion_timeout: Duration::from_secs(parse_nonzero_or(
                &lookup,
                "DAYCAM_CONVERSION_TIMEOUT_SECS",
                defaults.conversion_timeout.as_secs(),
            )),
            raw_extension: defaults.raw_extension,
            container_extension: defaults.container_extension,
            preview: parse_or(&lookup, "DAYCAM_PREVIEW", defaults.preview),
            camera,
            detector,
        })
    }

    /// Delay between retries when the camera yields no frame.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.camera.fps.max(1)
    }
}

fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Like [`parse_or`], treating zero as unset.
fn parse_nonzero_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + PartialEq + Default,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .filter(|v| *v != T::default())
        .unwrap_or(default)
}
