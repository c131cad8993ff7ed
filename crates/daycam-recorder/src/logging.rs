//! Structured segment logging.
//!
//! Every lifecycle event of a segment carries its index and raw path, so one
//! segment can be followed through a day of interleaved log lines.

use tracing::{error, info, warn, Span};

use daycam_models::Segment;

/// Logger bound to one recording segment.
#[derive(Debug, Clone)]
pub struct SegmentLogger {
    index: u32,
    path: String,
}

impl SegmentLogger {
    pub fn new(segment: &Segment) -> Self {
        Self {
            index: segment.index,
            path: segment.raw_path.display().to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            segment = self.index,
            path = %self.path,
            "Segment started: {}", message
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            segment = self.index,
            path = %self.path,
            "Segment progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            segment = self.index,
            path = %self.path,
            "Segment warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            segment = self.index,
            path = %self.path,
            "Segment error: {}", message
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            segment = self.index,
            path = %self.path,
            "Segment completed: {}", message
        );
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Span covering the whole segment lifecycle.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("segment", segment = self.index, path = %self.path)
    }
}
