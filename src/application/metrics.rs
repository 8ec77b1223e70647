//! Observability metrics for limiters and breakers.
//!
//! Every named config owns one [`Metrics`] handle. Counts are kept in
//! atomics so they can be read at any time, and mirrored into the `metrics`
//! facade so an application that installs a recorder can export them.

use crate::domain::state::CircuitState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter names exported through the `metrics` facade.
pub mod names {
    /// Every admission or execution attempt
    pub const REQUESTS_TOTAL: &str = "governor_requests_total";
    /// Admitted calls
    pub const REQUESTS_ALLOWED: &str = "governor_requests_allowed";
    /// Denied calls and breaker rejections
    pub const REQUESTS_DENIED: &str = "governor_requests_denied";
    /// Per-identifier entries dropped by eviction
    pub const ENTRIES_EVICTED: &str = "governor_entries_evicted";
    /// Breaker state: 0 closed, 1 open, 2 half-open
    pub const CIRCUIT_STATE: &str = "governor_circuit_state";
}

/// Metrics tracking allow/deny statistics for one config.
///
/// Cloning shares the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Config name, used as the export label
    name: String,
    /// Total number of calls admitted
    allowed: AtomicU64,
    /// Total number of calls denied or rejected
    denied: AtomicU64,
    /// Total number of entries evicted from storage
    evicted: AtomicU64,
}

impl Metrics {
    /// Create a metrics tracker labelled with a config name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                name: name.into(),
                allowed: AtomicU64::new(0),
                denied: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
            }),
        }
    }

    /// Config name these metrics belong to.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Record an admitted call.
    pub(crate) fn record_allowed(&self) {
        self.inner.allowed.fetch_add(1, Ordering::Relaxed);
        self.export(names::REQUESTS_TOTAL);
        self.export(names::REQUESTS_ALLOWED);
    }

    /// Record a denied or rejected call.
    pub(crate) fn record_denied(&self) {
        self.inner.denied.fetch_add(1, Ordering::Relaxed);
        self.export(names::REQUESTS_TOTAL);
        self.export(names::REQUESTS_DENIED);
    }

    /// Record an entry eviction.
    pub(crate) fn record_eviction(&self) {
        self.inner.evicted.fetch_add(1, Ordering::Relaxed);
        self.export(names::ENTRIES_EVICTED);
    }

    /// Publish a breaker state change.
    pub(crate) fn record_state(&self, state: CircuitState) {
        metrics::gauge!(names::CIRCUIT_STATE, "breaker" => self.inner.name.clone())
            .set(state.as_gauge());
    }

    fn export(&self, counter: &'static str) {
        metrics::counter!(counter, "config" => self.inner.name.clone()).increment(1);
    }

    /// Get the total number of admitted calls.
    pub fn allowed(&self) -> u64 {
        self.inner.allowed.load(Ordering::Relaxed)
    }

    /// Get the total number of denied or rejected calls.
    pub fn denied(&self) -> u64 {
        self.inner.denied.load(Ordering::Relaxed)
    }

    /// Get the total number of evicted entries.
    pub fn evicted(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed(),
            denied: self.denied(),
            evicted: self.evicted(),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.inner.allowed.store(0, Ordering::Relaxed);
        self.inner.denied.store(0, Ordering::Relaxed);
        self.inner.evicted.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    /// Total number of calls admitted
    pub allowed: u64,
    /// Total number of calls denied or rejected
    pub denied: u64,
    /// Total number of entries evicted
    pub evicted: u64,
}

impl MetricsSnapshot {
    /// Calculate the denial rate (0.0 to 1.0).
    ///
    /// Returns 0.0 if no calls have been seen.
    pub fn denial_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.denied as f64 / total as f64
        }
    }

    /// Get the total number of calls seen (allowed + denied).
    pub fn total_requests(&self) -> u64 {
        self.allowed.saturating_add(self.denied)
    }
}

/// Aggregated metrics for one named config, as returned by the registry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GovernorMetrics {
    /// Config name
    pub name: String,
    /// Allowed plus denied
    pub total_requests: u64,
    /// Admitted calls
    pub allowed: u64,
    /// Denied calls (limiters) or rejected calls (breakers)
    pub denied: u64,
    /// Evicted per-identifier entries (limiters)
    pub evicted: u64,
    /// Current window failure rate in percent (breakers)
    pub failure_rate: Option<f64>,
    /// Current window slow-call rate in percent (breakers)
    pub slow_call_rate: Option<f64>,
    /// Current state (breakers)
    pub state: Option<CircuitState>,
}

impl GovernorMetrics {
    pub(crate) fn from_snapshot(name: &str, snapshot: MetricsSnapshot) -> Self {
        Self {
            name: name.to_owned(),
            total_requests: snapshot.total_requests(),
            allowed: snapshot.allowed,
            denied: snapshot.denied,
            evicted: snapshot.evicted,
            failure_rate: None,
            slow_call_rate: None,
            state: None,
        }
    }
}
