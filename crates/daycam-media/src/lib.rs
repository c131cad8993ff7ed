#![deny(unreachable_patterns)]
//! Capture, detection and conversion for the daycam recorder.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and execution
//! - FFmpeg-backed camera capture with per-segment H.264 encoding
//! - Person detection (row decoding, NMS, OpenCV Darknet backend)
//! - Detection overlay and live preview sinks
//! - Raw stream to container conversion that never loses the source

pub mod annotate;
pub mod capture;
pub mod command;
pub mod detection;
pub mod error;
pub mod frame;
pub mod preview;
pub mod transcode;

pub use annotate::annotate;
pub use capture::{CameraConfig, CaptureDevice, FfmpegCamera};
pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use detection::{DetectorConfig, InferenceBackend, ModelBackend, PersonDetector};
pub use error::{MediaError, MediaResult};
pub use frame::Frame;
pub use preview::{HeadlessPreview, PreviewSink};
#[cfg(feature = "opencv")]
pub use preview::WindowPreview;
pub use transcode::{verify_segment, Converter, FfmpegConverter, TranscodePipeline};
