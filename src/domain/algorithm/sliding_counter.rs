//! Sliding window counter admission.

use super::{align_window, RateLimitAlgorithm, WindowConfig};
use crate::domain::decision::{instant_after, secs_f64, EvaluationResult};
use std::time::{Duration, Instant};

/// Per-identifier two-bucket approximation of the sliding window log.
///
/// The weighted count is `previous * (1 - elapsed / window) + current`, where
/// `elapsed` is the time since the current window started. Constant memory,
/// at the cost of assuming the previous window's calls were evenly spread.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindowCounter {
    config: WindowConfig,
    previous_count: u64,
    current_count: u64,
    window_start: Instant,
}

impl SlidingWindowCounter {
    /// Create a counter whose first window starts at `now`.
    pub fn new(config: WindowConfig, now: Instant) -> Self {
        Self {
            config,
            previous_count: 0,
            current_count: 0,
            window_start: now,
        }
    }

    /// Advance to the window containing `now`.
    fn roll(&mut self, now: Instant) {
        let (periods, start) = align_window(self.window_start, now, self.config.window());
        match periods {
            0 => {}
            1 => {
                self.previous_count = self.current_count;
                self.current_count = 0;
                self.window_start = start;
            }
            _ => {
                self.previous_count = 0;
                self.current_count = 0;
                self.window_start = start;
            }
        }
    }

    /// Fraction of the current window already elapsed, in `[0, 1)`.
    fn progress(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
        (elapsed / self.config.window().as_secs_f64()).min(1.0)
    }

    /// Weighted call count at `now` (assumes the window was already rolled).
    pub fn weighted_count(&self, now: Instant) -> f64 {
        self.previous_count as f64 * (1.0 - self.progress(now)) + self.current_count as f64
    }

    /// Time until the weighted count drops below the limit.
    fn retry_after(&self, now: Instant) -> Duration {
        let window = self.config.window().as_secs_f64();
        let limit = self.config.limit() as f64;
        let progress = self.progress(now);
        let previous = self.previous_count as f64;
        let current = self.current_count as f64;

        let wait = if current < limit && previous > 0.0 {
            // Solve previous * (1 - p) + current < limit for p
            let target = 1.0 - (limit - current) / previous;
            (target - progress) * window
        } else {
            // Current window alone is full; wait for it to become the previous one
            let next_window = (1.0 - progress) * window;
            let target = if current > 0.0 { 1.0 - limit / current } else { 0.0 };
            next_window + target.max(0.0) * window
        };
        secs_f64(wait)
    }
}

impl RateLimitAlgorithm for SlidingWindowCounter {
    fn evaluate(&mut self, now: Instant) -> EvaluationResult {
        self.roll(now);
        let limit = self.config.limit() as f64;
        let weighted = self.weighted_count(now);
        let reset_at = instant_after(self.window_start, self.config.window());

        if weighted < limit {
            self.current_count += 1;
            let remaining = (limit - weighted - 1.0).max(0.0).floor() as u64;
            EvaluationResult::allowed(remaining, reset_at)
        } else {
            EvaluationResult::denied(self.retry_after(now), reset_at)
        }
    }

    fn reset(&mut self, now: Instant) {
        self.previous_count = 0;
        self.current_count = 0;
        self.window_start = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(limit: u32, secs: u64, now: Instant) -> SlidingWindowCounter {
        SlidingWindowCounter::new(WindowConfig::new(limit, Duration::from_secs(secs)).unwrap(), now)
    }

    #[test]
    fn test_limit_within_first_window() {
        let start = Instant::now();
        let mut swc = counter(5, 10, start);
        for _ in 0..5 {
            assert!(swc.evaluate(start).is_allowed());
        }
        let denied = swc.evaluate(start + Duration::from_secs(1));
        assert!(!denied.is_allowed());
        // Full current window: wait 9s to roll, then the previous 5 weigh
        // 5 * (1 - p) < 5 for any p > 0
        assert_eq!(denied.retry_after_ms, 9_000);
    }

    #[test]
    fn test_previous_window_is_weighted() {
        let start = Instant::now();
        let mut swc = counter(10, 10, start);
        for _ in 0..10 {
            assert!(swc.evaluate(start).is_allowed());
        }

        // Halfway through the next window the previous 10 count as 5
        let halfway = start + Duration::from_secs(15);
        for i in 0..5 {
            assert!(swc.evaluate(halfway).is_allowed(), "call {} should be allowed", i);
        }
        assert!(!swc.evaluate(halfway).is_allowed());
        assert!((swc.weighted_count(halfway) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_retry_after_with_weighted_previous() {
        let start = Instant::now();
        let mut swc = counter(10, 10, start);
        for _ in 0..10 {
            swc.evaluate(start);
        }
        let at = start + Duration::from_secs(12);
        // weight 0.8 -> 8 from previous; two slots left
        assert!(swc.evaluate(at).is_allowed());
        assert!(swc.evaluate(at).is_allowed());
        let denied = swc.evaluate(at);
        assert!(!denied.is_allowed());
        // Need 10 * (1 - p) + 2 < 10 -> p > 0.2, which is now; wait rounds up to 1ms
        assert_eq!(denied.retry_after_ms, 1);
    }

    #[test]
    fn test_gap_of_two_windows_clears_history() {
        let start = Instant::now();
        let mut swc = counter(3, 1, start);
        for _ in 0..3 {
            swc.evaluate(start);
        }
        let much_later = start + Duration::from_secs(5);
        for _ in 0..3 {
            assert!(swc.evaluate(much_later).is_allowed());
        }
        assert!(!swc.evaluate(much_later).is_allowed());
    }

    #[test]
    fn test_reset() {
        let start = Instant::now();
        let mut swc = counter(1, 60, start);
        swc.evaluate(start);
        assert!(!swc.evaluate(start).is_allowed());
        swc.reset(start);
        assert!(swc.evaluate(start).is_allowed());
    }
}
