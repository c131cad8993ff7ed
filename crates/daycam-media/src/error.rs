//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while capturing, detecting or converting.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// Model artifacts missing, unreadable or rejected by the backend.
    #[error("Model load failed for {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    /// A single frame that cannot be fed to the detector.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The capture device could not start capturing or recording.
    #[error("Capture device failed to open: {0}")]
    DeviceOpen(String),

    /// The capture process ended; no further frames will arrive until restart.
    #[error("Capture device lost: {0}")]
    DeviceLost(String),

    /// The raw segment file is missing or empty after recording stopped.
    #[error("Segment output missing or empty: {0}")]
    SegmentWrite(PathBuf),

    /// The container conversion exited unsuccessfully.
    #[error("Conversion of {raw} failed: {message}")]
    Conversion {
        raw: PathBuf,
        message: String,
        exit_code: Option<i32>,
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Preview failed: {0}")]
    Preview(String),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create a model load error.
    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_frame(message: impl Into<String>) -> Self {
        Self::InvalidFrame(message.into())
    }

    pub fn device_open(message: impl Into<String>) -> Self {
        Self::DeviceOpen(message.into())
    }

    pub fn device_lost(message: impl Into<String>) -> Self {
        Self::DeviceLost(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn preview(message: impl Into<String>) -> Self {
        Self::Preview(message.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the capture device must be restarted before it can deliver again.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, MediaError::DeviceLost(_))
    }
}
