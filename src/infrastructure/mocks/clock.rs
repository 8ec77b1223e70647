//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Manually driven clock.
///
/// Every limiter refill, window roll and breaker wait reads time through the
/// [`Clock`] port, so a `MockClock` makes all of them deterministic. Clones
/// share the same time value.
///
/// # Examples
///
/// ```
/// use traffic_governor::infrastructure::mocks::MockClock;
/// use traffic_governor::{AlgorithmConfig, GovernorRegistry, LimiterConfig};
/// use std::sync::Arc;
/// use std::time::{Duration, Instant};
///
/// let clock = MockClock::new(Instant::now());
/// let registry = GovernorRegistry::builder()
///     .with_clock(Arc::new(clock.clone()))
///     .build()
///     .unwrap();
/// registry.create_config(
///     LimiterConfig::new("api", AlgorithmConfig::token_bucket(1, 1.0).unwrap()).unwrap(),
/// );
///
/// assert!(registry.evaluate("api", "alice").unwrap().is_allowed());
/// assert!(!registry.evaluate("api", "alice").unwrap().is_allowed());
///
/// clock.advance(Duration::from_secs(1));
/// assert!(registry.evaluate("api", "alice").unwrap().is_allowed());
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<Instant>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific instant.
    pub fn new(start: Instant) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    fn time(&self) -> MutexGuard<'_, Instant> {
        self.current_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        *self.time() += duration;
    }

    /// Advance the clock by whole milliseconds.
    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Set the clock to a specific instant.
    pub fn set(&self, instant: Instant) {
        *self.time() = instant;
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.time()
    }
}
