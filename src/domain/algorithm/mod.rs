//! Rate limiting algorithms.
//!
//! This module defines the core trait for admission algorithms and the five
//! built-in implementations. Each algorithm is split into an immutable config
//! (validated once, at construction) and the mutable per-identifier state the
//! config builds.

pub mod fixed_window;
pub mod leaky_bucket;
pub mod sliding_counter;
pub mod sliding_log;
pub mod token_bucket;

pub use fixed_window::FixedWindowCounter;
pub use leaky_bucket::{LeakyBucket, LeakyBucketConfig};
pub use sliding_counter::SlidingWindowCounter;
pub use sliding_log::SlidingWindowLog;
pub use token_bucket::{TokenBucket, TokenBucketConfig};

use crate::domain::config::ConfigError;
use crate::domain::decision::EvaluationResult;
use std::fmt;
use std::time::{Duration, Instant};

/// Slack for floating point refill arithmetic, so an arrival exactly one
/// refill period later is never denied by rounding.
pub(crate) const TOKEN_EPSILON: f64 = 1e-9;

/// Trait for admission algorithms.
///
/// Implementations decide whether one call may proceed at `now`. A denial
/// never consumes capacity.
pub trait RateLimitAlgorithm: Send + Sync {
    /// Register a call attempt and decide whether to admit it.
    fn evaluate(&mut self, now: Instant) -> EvaluationResult;

    /// Return to the state of a never-used identifier.
    fn reset(&mut self, now: Instant);
}

/// Parameters shared by the window-based algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindowConfig {
    limit: u32,
    window: Duration,
}

impl WindowConfig {
    /// Create a window config allowing `limit` calls per `window`.
    ///
    /// # Errors
    /// Returns an error if `limit` is zero or `window` is empty.
    pub fn new(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        if limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self { limit, window })
    }

    /// Calls allowed per window.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Find the window containing `now`.
///
/// Returns how many whole windows have passed since `start` and the start of
/// the window `now` falls into. Windows stay aligned to the original start.
pub(crate) fn align_window(start: Instant, now: Instant, window: Duration) -> (u128, Instant) {
    let elapsed = now.saturating_duration_since(start);
    let window_nanos = window.as_nanos().max(1);
    let periods = elapsed.as_nanos() / window_nanos;
    if periods == 0 {
        return (0, start);
    }
    let into_window = elapsed.as_nanos() % window_nanos;
    let into_window = Duration::from_nanos(u64::try_from(into_window).unwrap_or(u64::MAX));
    (periods, now.checked_sub(into_window).unwrap_or(now))
}

/// Which algorithm a limiter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlgorithmKind {
    /// Token bucket
    TokenBucket,
    /// Sliding window log
    SlidingWindowLog,
    /// Sliding window counter
    SlidingWindowCounter,
    /// Fixed window counter
    FixedWindowCounter,
    /// Leaky bucket
    LeakyBucket,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmKind::TokenBucket => "token_bucket",
            AlgorithmKind::SlidingWindowLog => "sliding_window_log",
            AlgorithmKind::SlidingWindowCounter => "sliding_window_counter",
            AlgorithmKind::FixedWindowCounter => "fixed_window_counter",
            AlgorithmKind::LeakyBucket => "leaky_bucket",
        };
        f.write_str(name)
    }
}

/// Validated algorithm parameters, one variant per algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AlgorithmConfig {
    /// Token bucket
    TokenBucket(TokenBucketConfig),
    /// Sliding window log
    SlidingWindowLog(WindowConfig),
    /// Sliding window counter
    SlidingWindowCounter(WindowConfig),
    /// Fixed window counter
    FixedWindowCounter(WindowConfig),
    /// Leaky bucket
    LeakyBucket(LeakyBucketConfig),
}

impl AlgorithmConfig {
    /// Token bucket with `capacity` burst and `refill_rate` tokens per second.
    pub fn token_bucket(capacity: u32, refill_rate: f64) -> Result<Self, ConfigError> {
        TokenBucketConfig::new(capacity, refill_rate).map(AlgorithmConfig::TokenBucket)
    }

    /// Exact log allowing `limit` calls in any span of `window`.
    pub fn sliding_window_log(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        WindowConfig::new(limit, window).map(AlgorithmConfig::SlidingWindowLog)
    }

    /// Weighted two-window approximation allowing about `limit` calls per `window`.
    pub fn sliding_window_counter(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        WindowConfig::new(limit, window).map(AlgorithmConfig::SlidingWindowCounter)
    }

    /// Counter allowing `limit` calls per fixed `window`.
    pub fn fixed_window_counter(limit: u32, window: Duration) -> Result<Self, ConfigError> {
        WindowConfig::new(limit, window).map(AlgorithmConfig::FixedWindowCounter)
    }

    /// Queue of `capacity` calls drained at `leak_rate` per second.
    pub fn leaky_bucket(capacity: u32, leak_rate: f64) -> Result<Self, ConfigError> {
        LeakyBucketConfig::new(capacity, leak_rate).map(AlgorithmConfig::LeakyBucket)
    }

    /// The algorithm discriminant.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            AlgorithmConfig::TokenBucket(_) => AlgorithmKind::TokenBucket,
            AlgorithmConfig::SlidingWindowLog(_) => AlgorithmKind::SlidingWindowLog,
            AlgorithmConfig::SlidingWindowCounter(_) => AlgorithmKind::SlidingWindowCounter,
            AlgorithmConfig::FixedWindowCounter(_) => AlgorithmKind::FixedWindowCounter,
            AlgorithmConfig::LeakyBucket(_) => AlgorithmKind::LeakyBucket,
        }
    }

    /// Create fresh per-identifier state.
    pub fn build(&self, now: Instant) -> AlgorithmState {
        match *self {
            AlgorithmConfig::TokenBucket(c) => AlgorithmState::TokenBucket(TokenBucket::new(c, now)),
            AlgorithmConfig::SlidingWindowLog(c) => {
                AlgorithmState::SlidingWindowLog(SlidingWindowLog::new(c))
            }
            AlgorithmConfig::SlidingWindowCounter(c) => {
                AlgorithmState::SlidingWindowCounter(SlidingWindowCounter::new(c, now))
            }
            AlgorithmConfig::FixedWindowCounter(c) => {
                AlgorithmState::FixedWindowCounter(FixedWindowCounter::new(c, now))
            }
            AlgorithmConfig::LeakyBucket(c) => AlgorithmState::LeakyBucket(LeakyBucket::new(c, now)),
        }
    }
}

/// Per-identifier algorithm state.
#[derive(Debug, Clone, PartialEq)]
pub enum AlgorithmState {
    /// Token bucket
    TokenBucket(TokenBucket),
    /// Sliding window log
    SlidingWindowLog(SlidingWindowLog),
    /// Sliding window counter
    SlidingWindowCounter(SlidingWindowCounter),
    /// Fixed window counter
    FixedWindowCounter(FixedWindowCounter),
    /// Leaky bucket
    LeakyBucket(LeakyBucket),
}

impl AlgorithmState {
    /// The algorithm discriminant.
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            AlgorithmState::TokenBucket(_) => AlgorithmKind::TokenBucket,
            AlgorithmState::SlidingWindowLog(_) => AlgorithmKind::SlidingWindowLog,
            AlgorithmState::SlidingWindowCounter(_) => AlgorithmKind::SlidingWindowCounter,
            AlgorithmState::FixedWindowCounter(_) => AlgorithmKind::FixedWindowCounter,
            AlgorithmState::LeakyBucket(_) => AlgorithmKind::LeakyBucket,
        }
    }
}

impl RateLimitAlgorithm for AlgorithmState {
    fn evaluate(&mut self, now: Instant) -> EvaluationResult {
        match self {
            AlgorithmState::TokenBucket(a) => a.evaluate(now),
            AlgorithmState::SlidingWindowLog(a) => a.evaluate(now),
            AlgorithmState::SlidingWindowCounter(a) => a.evaluate(now),
            AlgorithmState::FixedWindowCounter(a) => a.evaluate(now),
            AlgorithmState::LeakyBucket(a) => a.evaluate(now),
        }
    }

    fn reset(&mut self, now: Instant) {
        match self {
            AlgorithmState::TokenBucket(a) => a.reset(now),
            AlgorithmState::SlidingWindowLog(a) => a.reset(now),
            AlgorithmState::SlidingWindowCounter(a) => a.reset(now),
            AlgorithmState::FixedWindowCounter(a) => a.reset(now),
            AlgorithmState::LeakyBucket(a) => a.reset(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_matches_kind() {
        let now = Instant::now();
        let configs = [
            AlgorithmConfig::token_bucket(5, 1.0).unwrap(),
            AlgorithmConfig::sliding_window_log(5, Duration::from_secs(1)).unwrap(),
            AlgorithmConfig::sliding_window_counter(5, Duration::from_secs(1)).unwrap(),
            AlgorithmConfig::fixed_window_counter(5, Duration::from_secs(1)).unwrap(),
            AlgorithmConfig::leaky_bucket(5, 1.0).unwrap(),
        ];
        for config in configs {
            assert_eq!(config.build(now).kind(), config.kind());
        }
    }

    #[test]
    fn test_every_algorithm_admits_then_denies() {
        let now = Instant::now();
        let configs = [
            AlgorithmConfig::token_bucket(3, 0.001).unwrap(),
            AlgorithmConfig::sliding_window_log(3, Duration::from_secs(60)).unwrap(),
            AlgorithmConfig::sliding_window_counter(3, Duration::from_secs(60)).unwrap(),
            AlgorithmConfig::fixed_window_counter(3, Duration::from_secs(60)).unwrap(),
            AlgorithmConfig::leaky_bucket(3, 0.001).unwrap(),
        ];
        for config in configs {
            let mut state = config.build(now);
            for _ in 0..3 {
                assert!(state.evaluate(now).is_allowed(), "{} should admit", config.kind());
            }
            let denied = state.evaluate(now);
            assert!(!denied.is_allowed(), "{} should deny", config.kind());
            assert!(denied.retry_after_ms > 0);

            state.reset(now);
            assert!(state.evaluate(now).is_allowed(), "{} should admit after reset", config.kind());
        }
    }

    #[test]
    fn test_window_config_validation() {
        assert!(matches!(
            WindowConfig::new(0, Duration::from_secs(1)),
            Err(ConfigError::ZeroLimit)
        ));
        assert!(matches!(
            WindowConfig::new(1, Duration::ZERO),
            Err(ConfigError::ZeroWindow)
        ));
    }

    #[test]
    fn test_align_window() {
        let start = Instant::now();
        let window = Duration::from_secs(10);
        assert_eq!(align_window(start, start + Duration::from_secs(9), window), (0, start));
        assert_eq!(
            align_window(start, start + Duration::from_secs(10), window),
            (1, start + Duration::from_secs(10))
        );
        assert_eq!(
            align_window(start, start + Duration::from_secs(47), window),
            (4, start + Duration::from_secs(40))
        );
        // Clock going backwards stays in the current window
        assert_eq!(align_window(start + window, start, window), (0, start + window));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(AlgorithmKind::TokenBucket.to_string(), "token_bucket");
        assert_eq!(AlgorithmKind::LeakyBucket.to_string(), "leaky_bucket");
    }
}
