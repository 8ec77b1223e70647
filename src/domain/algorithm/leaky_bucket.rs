//! Leaky bucket admission.

use super::{RateLimitAlgorithm, TOKEN_EPSILON};
use crate::domain::config::ConfigError;
use crate::domain::decision::{instant_after, secs_f64, EvaluationResult};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Leaky bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LeakyBucketConfig {
    capacity: u32,
    leak_rate: f64,
}

impl LeakyBucketConfig {
    /// Create a leaky bucket config.
    ///
    /// # Arguments
    /// * `capacity` - Maximum queued calls
    /// * `leak_rate` - Queued calls drained per second
    ///
    /// # Errors
    /// Returns an error if `capacity` is zero or `leak_rate` is not a positive
    /// finite number.
    pub fn new(capacity: u32, leak_rate: f64) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !leak_rate.is_finite() || leak_rate <= 0.0 {
            return Err(ConfigError::InvalidRate(leak_rate));
        }
        Ok(Self {
            capacity,
            leak_rate,
        })
    }

    /// Maximum queued calls.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Calls drained per second.
    pub fn leak_rate(&self) -> f64 {
        self.leak_rate
    }

    fn leak_interval(&self) -> Duration {
        secs_f64(1.0 / self.leak_rate)
    }
}

/// Per-identifier queue of admitted calls drained at a constant rate.
#[derive(Debug, Clone, PartialEq)]
pub struct LeakyBucket {
    config: LeakyBucketConfig,
    queue: VecDeque<Instant>,
    last_leak: Instant,
}

impl LeakyBucket {
    /// Create an empty bucket.
    pub fn new(config: LeakyBucketConfig, now: Instant) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            last_leak: now,
        }
    }

    /// Drain the entries that leaked out since the last drain.
    fn leak(&mut self, now: Instant) {
        if self.queue.is_empty() {
            self.last_leak = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_leak).as_secs_f64();
        let leaked = (elapsed * self.config.leak_rate + TOKEN_EPSILON).floor();
        if leaked < 1.0 {
            return;
        }

        let leaked = leaked.min(self.queue.len() as f64) as usize;
        self.queue.drain(..leaked);
        if self.queue.is_empty() {
            self.last_leak = now;
        } else {
            // Keep the fractional progress toward the next leak
            let progress = secs_f64(leaked as f64 / self.config.leak_rate);
            self.last_leak = instant_after(self.last_leak, progress);
        }
    }

    /// Calls currently queued.
    pub fn queue_size(&self) -> usize {
        self.queue.len()
    }

    fn drain_time(&self) -> Duration {
        secs_f64(self.queue.len() as f64 / self.config.leak_rate)
    }
}

impl RateLimitAlgorithm for LeakyBucket {
    fn evaluate(&mut self, now: Instant) -> EvaluationResult {
        self.leak(now);
        let capacity = self.config.capacity as usize;

        if self.queue.len() < capacity {
            self.queue.push_back(now);
            let drained_at = instant_after(now, self.drain_time());
            EvaluationResult::allowed((capacity - self.queue.len()) as u64, drained_at)
        } else {
            let next_leak = instant_after(self.last_leak, self.config.leak_interval());
            let drained_at = instant_after(self.last_leak, self.drain_time());
            EvaluationResult::denied(next_leak.saturating_duration_since(now), drained_at)
        }
    }

    fn reset(&mut self, now: Instant) {
        self.queue.clear();
        self.last_leak = now;
    }
}
