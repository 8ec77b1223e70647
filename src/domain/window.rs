//! Sliding-window call statistics.
//!
//! A [`SlidingWindow`] keeps a rolling view over the most recent call outcomes
//! and maintains its aggregates incrementally: every record adds its
//! contribution on the way in and subtracts it again on eviction, so reading a
//! rate never walks the records.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a [`SlidingWindow`] bounds the records it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WindowType {
    /// Keep the most recent `n` calls.
    CountBased(usize),
    /// Keep calls no older than the given duration.
    TimeBased(Duration),
}

impl WindowType {
    /// Check if the window cannot hold any record.
    pub fn is_empty_window(&self) -> bool {
        match self {
            WindowType::CountBased(size) => *size == 0,
            WindowType::TimeBased(span) => span.is_zero(),
        }
    }
}

impl Default for WindowType {
    fn default() -> Self {
        WindowType::CountBased(100)
    }
}

/// One observed call outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Whether the call succeeded
    pub success: bool,
    /// Wall-clock duration of the call
    pub duration: Duration,
    /// Whether the call exceeded the slow-call threshold when it was recorded
    pub slow: bool,
    /// Error description for failed calls
    pub error: Option<Arc<str>>,
    /// When the call completed
    pub timestamp: Instant,
}

impl CallRecord {
    /// Create a record, classifying it as slow against `slow_call_duration`.
    ///
    /// The classification is fixed here so later threshold changes never
    /// reinterpret calls already in a window.
    pub fn new(
        success: bool,
        duration: Duration,
        slow_call_duration: Duration,
        timestamp: Instant,
    ) -> Self {
        Self {
            success,
            duration,
            slow: duration > slow_call_duration,
            error: None,
            timestamp,
        }
    }

    /// Attach an error description.
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Fixed-capacity rolling record of call outcomes with running aggregates.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window_type: WindowType,
    records: VecDeque<CallRecord>,
    failed_calls: u64,
    slow_calls: u64,
    total_duration: Duration,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(window_type: WindowType) -> Self {
        let records = match window_type {
            WindowType::CountBased(size) => VecDeque::with_capacity(size.min(1024) + 1),
            WindowType::TimeBased(_) => VecDeque::new(),
        };
        Self {
            window_type,
            records,
            failed_calls: 0,
            slow_calls: 0,
            total_duration: Duration::ZERO,
        }
    }

    /// Append a record and evict whatever no longer fits.
    pub fn record(&mut self, record: CallRecord) {
        let now = record.timestamp;
        if !record.success {
            self.failed_calls += 1;
        }
        if record.slow {
            self.slow_calls += 1;
        }
        self.total_duration = self.total_duration.saturating_add(record.duration);
        self.records.push_back(record);
        self.evict(now);
    }

    /// Drop records that fell out of the window as of `now`.
    ///
    /// Only time-based windows age; count-based windows are trimmed on insert.
    pub fn evict(&mut self, now: Instant) {
        match self.window_type {
            WindowType::CountBased(size) => {
                while self.records.len() > size {
                    self.pop_front();
                }
            }
            WindowType::TimeBased(span) => {
                while let Some(oldest) = self.records.front() {
                    if now.saturating_duration_since(oldest.timestamp) > span {
                        self.pop_front();
                    } else {
                        break;
                    }
                }
            }
        }
    }

    fn pop_front(&mut self) {
        if let Some(evicted) = self.records.pop_front() {
            if !evicted.success {
                self.failed_calls -= 1;
            }
            if evicted.slow {
                self.slow_calls -= 1;
            }
            self.total_duration = self.total_duration.saturating_sub(evicted.duration);
        }
    }

    /// Clear all records and aggregates.
    pub fn reset(&mut self) {
        self.records.clear();
        self.failed_calls = 0;
        self.slow_calls = 0;
        self.total_duration = Duration::ZERO;
    }

    /// Window bounds.
    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Number of calls currently in the window.
    pub fn total_calls(&self) -> u64 {
        self.records.len() as u64
    }

    /// Number of failed calls currently in the window.
    pub fn failed_calls(&self) -> u64 {
        self.failed_calls
    }

    /// Number of slow calls currently in the window.
    pub fn slow_calls(&self) -> u64 {
        self.slow_calls
    }

    /// Sum of call durations currently in the window.
    pub fn total_duration(&self) -> Duration {
        self.total_duration
    }

    /// Mean call duration, or zero for an empty window.
    pub fn average_duration(&self) -> Duration {
        match self.total_calls() {
            0 => Duration::ZERO,
            n => self.total_duration / n as u32,
        }
    }

    /// Failed calls as a percentage (0.0 to 100.0) of the window.
    pub fn failure_rate(&self) -> f64 {
        percentage(self.failed_calls, self.total_calls())
    }

    /// Slow calls as a percentage (0.0 to 100.0) of the window.
    pub fn slow_call_rate(&self) -> f64 {
        percentage(self.slow_calls, self.total_calls())
    }

    /// Check if the window holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over the records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &CallRecord> {
        self.records.iter()
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
