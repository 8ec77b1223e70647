//! Sliding window log admission.

use super::{RateLimitAlgorithm, WindowConfig};
use crate::domain::decision::{instant_after, EvaluationResult};
use std::collections::VecDeque;
use std::time::Instant;

/// Per-identifier log of admitted timestamps.
///
/// Exact: at most `limit` calls are admitted in any span of `window`. Memory
/// grows with `limit`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlidingWindowLog {
    config: WindowConfig,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindowLog {
    /// Create an empty log.
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            timestamps: VecDeque::new(),
        }
    }

    /// Forget timestamps that have aged out of the window.
    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= self.config.window() {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of admitted calls still inside the window.
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Check if no admitted calls are inside the window.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

impl RateLimitAlgorithm for SlidingWindowLog {
    fn evaluate(&mut self, now: Instant) -> EvaluationResult {
        self.expire(now);
        let limit = self.config.limit() as usize;

        if self.timestamps.len() < limit {
            self.timestamps.push_back(now);
            let oldest = self.timestamps.front().copied().unwrap_or(now);
            let remaining = (limit - self.timestamps.len()) as u64;
            EvaluationResult::allowed(remaining, instant_after(oldest, self.config.window()))
        } else {
            let oldest = self.timestamps.front().copied().unwrap_or(now);
            let expires_at = instant_after(oldest, self.config.window());
            EvaluationResult::denied(expires_at.saturating_duration_since(now), expires_at)
        }
    }

    fn reset(&mut self, _now: Instant) {
        self.timestamps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn log(limit: u32, secs: u64) -> SlidingWindowLog {
        SlidingWindowLog::new(WindowConfig::new(limit, Duration::from_secs(secs)).unwrap())
    }

    #[test]
    fn test_exact_limit_within_window() {
        let start = Instant::now();
        let mut swl = log(10, 60);

        for i in 0..10u64 {
            let at = start + Duration::from_secs(i);
            assert!(swl.evaluate(at).is_allowed(), "call {} should be allowed", i);
        }

        let eleventh = swl.evaluate(start + Duration::from_secs(30));
        assert!(!eleventh.is_allowed());
        // Oldest call (t=0) expires at t=60
        assert_eq!(eleventh.retry_after_ms, 30_000);
        assert_eq!(swl.len(), 10);
    }

    #[test]
    fn test_oldest_expiry_frees_one_slot() {
        let start = Instant::now();
        let mut swl = log(2, 10);

        assert!(swl.evaluate(start).is_allowed());
        assert!(swl.evaluate(start + Duration::from_secs(5)).is_allowed());
        assert!(!swl.evaluate(start + Duration::from_secs(9)).is_allowed());

        // t=0 is gone, t=5 still counts
        assert!(swl.evaluate(start + Duration::from_secs(10)).is_allowed());
        let denied = swl.evaluate(start + Duration::from_secs(11));
        assert!(!denied.is_allowed());
        assert_eq!(denied.retry_after_ms, 4_000);
    }

    #[test]
    fn test_remaining_counts_down() {
        let start = Instant::now();
        let mut swl = log(3, 1);
        assert_eq!(swl.evaluate(start).remaining, 2);
        assert_eq!(swl.evaluate(start).remaining, 1);
        assert_eq!(swl.evaluate(start).remaining, 0);
        assert!(!swl.evaluate(start).is_allowed());
    }

    #[test]
    fn test_denial_appends_nothing() {
        let start = Instant::now();
        let mut swl = log(1, 60);
        swl.evaluate(start);
        for _ in 0..100 {
            swl.evaluate(start);
        }
        assert_eq!(swl.len(), 1);
    }

    #[test]
    fn test_reset() {
        let start = Instant::now();
        let mut swl = log(1, 60);
        swl.evaluate(start);
        swl.reset(start);
        assert!(swl.is_empty());
        assert!(swl.evaluate(start).is_allowed());
    }
}
