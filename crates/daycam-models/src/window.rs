//! Daily recording window.
//!
//! The window is a time-of-day interval evaluated against the wall clock on
//! every scheduler poll. It never spans midnight.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors produced when building a [`RecordingWindow`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("recording window start {start} must be before end {end}")]
    StartNotBeforeEnd { start: NaiveTime, end: NaiveTime },

    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
}

/// Time-of-day interval during which recording is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingWindow {
    start: NaiveTime,
    end: NaiveTime,
}

impl RecordingWindow {
    /// Create a window. Rejects `start >= end`.
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, WindowError> {
        if start >= end {
            return Err(WindowError::StartNotBeforeEnd { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a window from hour/minute pairs.
    pub fn from_hm(
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
    ) -> Result<Self, WindowError> {
        let start = NaiveTime::from_hms_opt(start_hour, start_minute, 0)
            .ok_or_else(|| WindowError::InvalidTime(format!("{start_hour}:{start_minute}")))?;
        let end = NaiveTime::from_hms_opt(end_hour, end_minute, 0)
            .ok_or_else(|| WindowError::InvalidTime(format!("{end_hour}:{end_minute}")))?;
        Self::new(start, end)
    }

    /// Parse a window from two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, WindowError> {
        Self::new(parse_time_of_day(start)?, parse_time_of_day(end)?)
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    /// Window start on the given calendar day.
    pub fn start_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start)
    }

    /// Window end on the given calendar day.
    pub fn end_on(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.end)
    }

    /// Whether `now` falls inside today's `[start, end]` (both inclusive).
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let date = now.date();
        self.start_on(date) <= now && now <= self.end_on(date)
    }

    /// Whether `now` is at or past today's window end.
    pub fn has_closed(&self, now: NaiveDateTime) -> bool {
        now >= self.end_on(now.date())
    }

    /// When a segment opened at `segment_start` must close:
    /// `min(segment_start + max_duration, window_end)`.
    pub fn segment_deadline(
        &self,
        segment_start: NaiveDateTime,
        max_duration: Duration,
    ) -> NaiveDateTime {
        let window_end = self.end_on(segment_start.date());
        match chrono::Duration::from_std(max_duration) {
            Ok(max) => segment_start
                .checked_add_signed(max)
                .map_or(window_end, |by_duration| by_duration.min(window_end)),
            Err(_) => window_end,
        }
    }
}

impl Default for RecordingWindow {
    /// 05:20 to 17:40.
    fn default() -> Self {
        Self {
            start: time_of_day(5, 20),
            end: time_of_day(17, 40),
        }
    }
}

impl fmt::Display for RecordingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// Parse an `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, WindowError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| WindowError::InvalidTime(value.to_string()))
}

fn time_of_day(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_default_window() {
        let window = RecordingWindow::default();
        assert_eq!(window.to_string(), "05:20-17:40");
    }

    #[test]
    fn test_rejects_inverted_window() {
        assert!(RecordingWindow::from_hm(18, 0, 6, 0).is_err());
        assert!(RecordingWindow::from_hm(6, 0, 6, 0).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_time() {
        assert!(matches!(
            RecordingWindow::from_hm(25, 0, 26, 0),
            Err(WindowError::InvalidTime(_))
        ));
    }

    #[test]
    fn test_parse() {
        let window = RecordingWindow::parse("05:20", "17:40").unwrap();
        assert_eq!(window, RecordingWindow::default());
        assert!(RecordingWindow::parse("5h", "17:40").is_err());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let window = RecordingWindow::default();
        assert!(window.contains(at(5, 20)));
        assert!(window.contains(at(12, 0)));
        assert!(window.contains(at(17, 40)));
        assert!(!window.contains(at(5, 19)));
        assert!(!window.contains(at(17, 41)));
        assert!(!window.contains(at(0, 0)));
    }

    #[test]
    fn test_has_closed() {
        let window = RecordingWindow::default();
        assert!(!window.has_closed(at(17, 39)));
        assert!(window.has_closed(at(17, 40)));
    }

    #[test]
    fn test_deadline_bounded_by_window_end() {
        let window = RecordingWindow::from_hm(5, 20, 16, 30).unwrap();
        let deadline = window.segment_deadline(at(16, 0), Duration::from_secs(2 * 3600));
        assert_eq!(deadline, at(16, 30));
    }

    #[test]
    fn test_deadline_bounded_by_max_duration() {
        let window = RecordingWindow::default();
        let deadline = window.segment_deadline(at(8, 0), Duration::from_secs(2 * 3600));
        assert_eq!(deadline, at(10, 0));
    }
}
