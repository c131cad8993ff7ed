//! Person detector: model loading plus decode and NMS over backend output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use daycam_models::Detection;
use tracing::{debug, info};

use super::backend::InferenceBackend;
use super::decode::decode_candidates;
use super::nms::non_maximum_suppression;
use crate::error::{MediaError, MediaResult};
use crate::frame::{validate_frame, Frame};

/// Which inference backend loads the model artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelBackend {
    /// Darknet weights + cfg through OpenCV DNN
    #[default]
    Darknet,
}

impl ModelBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelBackend::Darknet => "darknet",
        }
    }
}

impl fmt::Display for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelBackend {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "darknet" | "yolov3" => Ok(ModelBackend::Darknet),
            other => Err(MediaError::internal(format!("unknown model backend '{other}'"))),
        }
    }
}

/// Configuration for person detection.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Trained weights (e.g. `yolov3.weights`)
    pub weights_path: PathBuf,
    /// Network topology (e.g. `yolov3.cfg`)
    pub topology_path: PathBuf,
    pub backend: ModelBackend,
    /// Minimum person score, exclusive
    pub confidence_threshold: f32,
    /// IoU above which overlapping boxes are suppressed
    pub nms_threshold: f32,
    /// Index of "person" in the model's label map
    pub person_class: usize,
    /// Square network input size
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("models/yolov3.weights"),
            topology_path: PathBuf::from("models/yolov3.cfg"),
            backend: ModelBackend::Darknet,
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
            person_class: 0,
            input_size: 416,
        }
    }
}

/// Person detector over a pluggable inference backend.
pub struct PersonDetector {
    backend: Box<dyn InferenceBackend>,
    config: DetectorConfig,
}

impl PersonDetector {
    /// Load the configured model.
    ///
    /// Fails with [`MediaError::ModelLoad`] if either artifact is missing,
    /// empty or rejected by the backend. No recording may start without a
    /// loaded detector.
    pub fn load(config: DetectorConfig) -> MediaResult<Self> {
        info!(
            weights = %config.weights_path.display(),
            topology = %config.topology_path.display(),
            backend = %config.backend,
            "Loading person detection model"
        );

        verify_artifact(&config.weights_path)?;
        verify_artifact(&config.topology_path)?;

        let backend = load_backend(&config)?;
        info!(backend = backend.name(), "Person detection model loaded");

        Ok(Self { backend, config })
    }

    /// Build a detector around an already-initialized backend.
    pub fn with_backend(backend: Box<dyn InferenceBackend>, config: DetectorConfig) -> Self {
        Self { backend, config }
    }

    /// Detect people in `frame`.
    ///
    /// Runs synchronously on the caller's thread; at 30 fps the forward pass
    /// is the dominant per-frame cost.
    pub fn detect(&mut self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        validate_frame(frame)?;
        let (width, height) = frame.dimensions();

        let rows = self.backend.forward(frame)?;
        let candidates = decode_candidates(
            &rows,
            self.backend.layout(),
            width,
            height,
            self.config.person_class,
            self.config.confidence_threshold,
        );
        let detections = non_maximum_suppression(
            candidates,
            self.config.confidence_threshold,
            self.config.nms_threshold,
        );

        debug!(
            candidates = rows.len(),
            count = detections.len(),
            "Person detection completed"
        );

        Ok(detections)
    }
}

/// Artifact must be a readable, non-empty regular file.
fn verify_artifact(path: &Path) -> MediaResult<()> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| MediaError::model_load(path, format!("cannot read model artifact: {e}")))?;
    if !metadata.is_file() {
        return Err(MediaError::model_load(path, "model artifact is not a file"));
    }
    if metadata.len() == 0 {
        return Err(MediaError::model_load(path, "model artifact is empty"));
    }
    Ok(())
}

#[cfg(feature = "opencv")]
fn load_backend(config: &DetectorConfig) -> MediaResult<Box<dyn InferenceBackend>> {
    match config.backend {
        ModelBackend::Darknet => Ok(Box::new(super::darknet::DarknetBackend::load(
            &config.weights_path,
            &config.topology_path,
            config.input_size,
        )?)),
    }
}

#[cfg(not(feature = "opencv"))]
fn load_backend(config: &DetectorConfig) -> MediaResult<Box<dyn InferenceBackend>> {
    Err(MediaError::model_load(
        &config.weights_path,
        format!(
            "{} backend requires daycam-media to be built with the `opencv` feature",
            config.backend
        ),
    ))
}
