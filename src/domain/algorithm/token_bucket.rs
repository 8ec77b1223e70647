//! Token bucket admission.

use super::{RateLimitAlgorithm, TOKEN_EPSILON};
use crate::domain::config::ConfigError;
use crate::domain::decision::{instant_after, secs_f64, EvaluationResult};
use std::time::Instant;

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TokenBucketConfig {
    capacity: u32,
    refill_rate: f64,
}

impl TokenBucketConfig {
    /// Create a token bucket config.
    ///
    /// # Arguments
    /// * `capacity` - Maximum burst size
    /// * `refill_rate` - Tokens added per second
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero or `refill_rate` is not a positive
    /// finite number.
    pub fn new(capacity: u32, refill_rate: f64) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(ConfigError::InvalidRate(refill_rate));
        }
        Ok(Self {
            capacity,
            refill_rate,
        })
    }

    /// Maximum burst size.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

/// Per-identifier token bucket state.
///
/// Starts full. Refill is computed lazily from the time since the last
/// admission, so a denial leaves the stored state untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucket {
    config: TokenBucketConfig,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(config: TokenBucketConfig, now: Instant) -> Self {
        Self {
            config,
            tokens: config.capacity as f64,
            last_refill: now,
        }
    }

    /// Tokens available at `now`, including refill since the last admission.
    pub fn available(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * self.config.refill_rate).min(self.config.capacity as f64)
    }

    /// Stored token count as of the last admission.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    fn time_to_accrue(&self, from: f64, to: f64) -> std::time::Duration {
        secs_f64((to - from) / self.config.refill_rate)
    }
}

impl RateLimitAlgorithm for TokenBucket {
    fn evaluate(&mut self, now: Instant) -> EvaluationResult {
        let available = self.available(now);
        let capacity = self.config.capacity as f64;

        if available + TOKEN_EPSILON >= 1.0 {
            self.tokens = (available - 1.0).max(0.0);
            self.last_refill = now;
            let reset_at = instant_after(now, self.time_to_accrue(self.tokens, capacity));
            EvaluationResult::allowed((self.tokens + TOKEN_EPSILON).floor() as u64, reset_at)
        } else {
            let retry_after = self.time_to_accrue(available, 1.0);
            let reset_at = instant_after(now, self.time_to_accrue(available, capacity));
            EvaluationResult::denied(retry_after, reset_at)
        }
    }

    fn reset(&mut self, now: Instant) {
        self.tokens = self.config.capacity as f64;
        self.last_refill = now;
    }
}
