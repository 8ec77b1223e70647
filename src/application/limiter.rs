//! Rate limiter coordination logic.
//!
//! A [`RateLimiter`] owns the per-identifier entries of one limiter config.
//! Each entry is created lazily on first evaluation and evaluated under its
//! storage lock, so the refill-check-consume sequence is atomic per entry.

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Storage};
use crate::domain::algorithm::{AlgorithmState, RateLimitAlgorithm};
use crate::domain::config::LimiterConfig;
use crate::domain::decision::EvaluationResult;
use crate::infrastructure::storage::ShardedStorage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runtime state of one identifier under one limiter.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterEntry {
    /// Algorithm state
    pub state: AlgorithmState,
    /// Calls admitted for this identifier
    pub allowed: u64,
    /// Calls denied for this identifier
    pub denied: u64,
    /// When the entry was created
    pub created_at: Instant,
    /// Last evaluation
    pub last_seen: Instant,
}

impl LimiterEntry {
    /// Create a fresh entry.
    pub fn new(state: AlgorithmState, now: Instant) -> Self {
        Self {
            state,
            allowed: 0,
            denied: 0,
            created_at: now,
            last_seen: now,
        }
    }

    fn evaluate(&mut self, now: Instant) -> EvaluationResult {
        self.last_seen = now;
        let result = self.state.evaluate(now);
        if result.is_allowed() {
            self.allowed += 1;
        } else {
            self.denied += 1;
        }
        result
    }
}

/// Coordinates admission decisions for one limiter config.
///
/// Generic over the storage implementation; the registry uses
/// [`ShardedStorage`].
#[derive(Debug)]
pub struct RateLimiter<S = ShardedStorage<String, LimiterEntry>>
where
    S: Storage<String, LimiterEntry>,
{
    config: LimiterConfig,
    storage: S,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl<S> RateLimiter<S>
where
    S: Storage<String, LimiterEntry>,
{
    /// Create a new rate limiter.
    ///
    /// # Arguments
    /// * `config` - The limiter config
    /// * `storage` - Per-identifier entry storage
    /// * `clock` - Time source
    /// * `metrics` - Metrics tracker
    pub fn new(config: LimiterConfig, storage: S, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            config,
            storage,
            clock,
            metrics,
        }
    }

    /// Decide whether one call from `identifier` may proceed.
    ///
    /// A denial is returned as data and consumes nothing.
    pub fn evaluate(&self, identifier: &str) -> EvaluationResult {
        let now = self.clock.now();
        let key = self.config.scope().key(identifier);
        let algorithm = self.config.algorithm();
        let result = self.storage.with_entry_mut(
            key,
            || LimiterEntry::new(algorithm.build(now), now),
            |entry| entry.evaluate(now),
        );

        if result.is_allowed() {
            self.metrics.record_allowed();
        } else {
            self.metrics.record_denied();
            tracing::debug!(
                limiter = %self.config.name(),
                identifier,
                retry_after_ms = result.retry_after_ms,
                "call denied"
            );
        }
        result
    }

    /// Get a copy of the entry for `identifier`, creating it if necessary.
    pub fn get_or_create_entry(&self, identifier: &str) -> LimiterEntry {
        let now = self.clock.now();
        let key = self.config.scope().key(identifier);
        let algorithm = self.config.algorithm();
        self.storage.with_entry_mut(
            key,
            || LimiterEntry::new(algorithm.build(now), now),
            |entry| entry.clone(),
        )
    }

    /// Get a copy of the entry for `identifier` without creating it.
    pub fn entry(&self, identifier: &str) -> Option<LimiterEntry> {
        let key = self.config.scope().key(identifier);
        self.storage.with_existing_mut(&key, |entry| entry.clone())
    }

    /// Forget one identifier, or every identifier when `None`.
    ///
    /// The next evaluation behaves as for a never-used identifier. Other
    /// identifiers are untouched.
    pub fn reset(&self, identifier: Option<&str>) {
        match identifier {
            Some(identifier) => {
                let key = self.config.scope().key(identifier);
                self.storage.remove(&key);
                tracing::info!(limiter = %self.config.name(), identifier, "limiter entry reset");
            }
            None => {
                self.storage.clear();
                tracing::info!(limiter = %self.config.name(), "limiter reset");
            }
        }
    }

    /// Drop entries not evaluated within `max_idle`. Returns how many were
    /// dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = self.clock.now();
        let before = self.storage.len();
        self.storage
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= max_idle);
        let removed = before.saturating_sub(self.storage.len());
        if removed > 0 {
            tracing::debug!(limiter = %self.config.name(), removed, "idle entries swept");
        }
        removed
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if no identifiers are tracked.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Limiter configuration.
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
