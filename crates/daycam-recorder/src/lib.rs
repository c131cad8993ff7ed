//! Daily segmented recorder.
//!
//! This crate provides:
//! - Environment-driven configuration
//! - The per-segment recording state machine
//! - Back-to-back segment runs bounded by the daily window
//! - The polling scheduler and clean shutdown

pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod logging;
pub mod recorder;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PreviewMode, RecorderConfig};
pub use cycle::{DetectorLoader, RecordingCycle, RecordingRun, RunSummary};
pub use error::{RecorderError, RecorderResult};
pub use logging::SegmentLogger;
pub use recorder::{SegmentRecorder, SegmentReport, StopReason};
pub use scheduler::{DailyScheduler, TickOutcome};
