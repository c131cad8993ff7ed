//! Shared data models for the daycam recorder.
//!
//! This crate provides Serde-serializable types for:
//! - Person detections and pixel bounding boxes
//! - The daily recording window
//! - Recording segments and their lifecycle states

pub mod detection;
pub mod segment;
pub mod window;

// Re-export common types
pub use detection::{BoundingBox, Detection, PERSON_LABEL};
pub use segment::{
    Segment, SegmentOutcome, SegmentState, CONTAINER_EXTENSION, RAW_EXTENSION, SEGMENT_PREFIX,
};
pub use window::{RecordingWindow, WindowError};
