//! Recorder error types.

use std::path::PathBuf;
use thiserror::Error;

use daycam_media::MediaError;

pub type RecorderResult<T> = Result<T, RecorderError>;

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Detector could not be loaded; the cycle records nothing.
    #[error("Model load failed: {0}")]
    ModelLoad(#[source] MediaError),

    /// Camera or encoder could not start; the cycle is aborted.
    #[error("Capture device failed to open ({stage}): {source}")]
    DeviceOpen {
        stage: &'static str,
        #[source]
        source: MediaError,
    },

    #[error("Output directory {path} unavailable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn device_open(stage: &'static str, source: MediaError) -> Self {
        Self::DeviceOpen { stage, source }
    }

    /// Pipeline stage the error came from, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            RecorderError::Config(_) => "config",
            RecorderError::ModelLoad(_) => "model_load",
            RecorderError::DeviceOpen { stage, .. } => *stage,
            RecorderError::OutputDir { .. } => "output_dir",
            RecorderError::Media(_) | RecorderError::Io(_) => "recording",
        }
    }
}
