//! Recording segments.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name prefix shared by raw and converted segment files.
pub const SEGMENT_PREFIX: &str = "video_parte_";

/// Extension of the encoder's raw H.264 stream.
pub const RAW_EXTENSION: &str = "h264";

/// Extension of the playback-ready container.
pub const CONTAINER_EXTENSION: &str = "mp4";

/// One bounded-duration recording and its converted counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position within the current recording run, starting at 0
    pub index: u32,
    /// Raw encoded stream written by the capture device
    pub raw_path: PathBuf,
    /// Container file produced by the transcode step
    pub converted_path: PathBuf,
    /// Wall-clock time at which recording must stop
    pub scheduled_end: NaiveDateTime,
}

impl Segment {
    /// Create a segment with the default `h264` / `mp4` extensions.
    pub fn new(dir: impl AsRef<Path>, index: u32, scheduled_end: NaiveDateTime) -> Self {
        Self::with_extensions(dir, index, scheduled_end, RAW_EXTENSION, CONTAINER_EXTENSION)
    }

    /// Create a segment with explicit raw and container extensions.
    pub fn with_extensions(
        dir: impl AsRef<Path>,
        index: u32,
        scheduled_end: NaiveDateTime,
        raw_ext: &str,
        container_ext: &str,
    ) -> Self {
        let dir = dir.as_ref();
        Self {
            index,
            raw_path: dir.join(format!("{SEGMENT_PREFIX}{index}.{raw_ext}")),
            converted_path: dir.join(format!("{SEGMENT_PREFIX}{index}.{container_ext}")),
            scheduled_end,
        }
    }
}

/// Lifecycle state of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    #[default]
    Idle,
    /// Output path allocated, device asked to start writing
    Opening,
    /// Frames flowing through detection and preview
    Recording,
    /// Device stopped, raw file being verified
    Closing,
    /// Raw file verified and handed to the transcode step
    Done,
    Failed,
}

impl SegmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentState::Idle => "idle",
            SegmentState::Opening => "opening",
            SegmentState::Recording => "recording",
            SegmentState::Closing => "closing",
            SegmentState::Done => "done",
            SegmentState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentState::Done | SegmentState::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SegmentState) -> bool {
        use SegmentState::*;
        match (self, next) {
            (Idle, Opening) | (Opening, Recording) | (Recording, Closing) | (Closing, Done) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// How a finished segment ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentOutcome {
    /// Container written, raw stream removed
    Converted,
    /// Converter failed, raw stream preserved for manual recovery
    ConversionFailed,
    /// Raw stream missing or empty after closing, nothing to convert
    WriteFailed,
}

impl SegmentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentOutcome::Converted => "converted",
            SegmentOutcome::ConversionFailed => "conversion_failed",
            SegmentOutcome::WriteFailed => "write_failed",
        }
    }
}
