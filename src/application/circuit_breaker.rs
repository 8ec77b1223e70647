//! Circuit breaker for fault isolation.
//!
//! A breaker wraps an arbitrary operation, records each outcome into a
//! [`SlidingWindow`], and opens when the failure or slow-call rate crosses
//! its threshold. While open, calls are rejected without running and the
//! configured [`FallbackStrategy`] decides what the caller sees. After the
//! wait duration a limited number of trial calls test recovery.
//!
//! All state changes happen under one mutex held only for bookkeeping, never
//! while the wrapped operation runs.

use crate::application::error::{ExecuteError, GovernorError};
use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::config::BreakerConfig;
use crate::domain::decision::{ceil_millis, instant_after};
use crate::domain::fallback::{CallOutcome, FallbackCause, FallbackStrategy, QueueAck};
use crate::domain::state::{CircuitState, StateTransition, TransitionCause};
use crate::domain::window::{CallRecord, SlidingWindow};
use crate::infrastructure::clock::SystemClock;
use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Transitions kept per breaker.
pub const HISTORY_CAPACITY: usize = 64;

/// Permission to run one call, returned by [`CircuitBreaker::try_acquire`].
///
/// The permit remembers which breaker generation admitted it. Outcomes of
/// calls admitted before a state change are not counted against the new
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "report the call outcome with on_success or on_error"]
pub struct CallPermit {
    generation: u64,
    state: CircuitState,
    started: Instant,
}

impl CallPermit {
    /// State the breaker was in when the call was admitted.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// When the call was admitted.
    pub fn started(&self) -> Instant {
        self.started
    }
}

/// Why [`CircuitBreaker::try_acquire`] turned a call away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// State at rejection
    pub state: CircuitState,
    /// Milliseconds until the breaker leaves OPEN; zero when half-open
    /// trials are exhausted and the wait depends on their outcome
    pub retry_after_ms: u64,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakerSnapshot {
    /// Breaker name
    pub name: String,
    /// Current state
    pub state: CircuitState,
    /// Calls in the window
    pub total_calls: u64,
    /// Failed calls in the window
    pub failed_calls: u64,
    /// Slow calls in the window
    pub slow_calls: u64,
    /// Failure rate in percent
    pub failure_rate: f64,
    /// Slow-call rate in percent
    pub slow_call_rate: f64,
    /// Trial calls admitted in the current half-open period
    pub half_open_calls: u32,
    /// Trial calls that succeeded in the current half-open period
    pub half_open_successes: u32,
    /// Calls rejected since creation or the last reset
    pub rejected: u64,
    /// Time spent in the current state
    pub in_state_for: Duration,
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    generation: u64,
    window: SlidingWindow,
    last_state_change: Instant,
    opened_at: Option<Instant>,
    half_open_calls: u32,
    half_open_successes: u32,
    history: VecDeque<StateTransition>,
}

impl BreakerCore {
    fn new(config: &BreakerConfig, now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            generation: 0,
            window: SlidingWindow::new(config.window_type()),
            last_state_change: now,
            opened_at: None,
            half_open_calls: 0,
            half_open_successes: 0,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }
}

/// Per-resource circuit breaker.
///
/// # Examples
///
/// ```
/// use traffic_governor::{BreakerConfig, CircuitBreaker, CircuitState};
/// use std::time::Duration;
///
/// let config = BreakerConfig::builder("inventory")
///     .minimum_calls(4)
///     .count_window(4)
///     .wait_duration(Duration::from_secs(30))
///     .build()
///     .unwrap();
/// let breaker = CircuitBreaker::new(config);
///
/// for _ in 0..4 {
///     let _ = breaker.execute(|| Err::<u32, _>("connection refused"));
/// }
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// // Rejected without running the operation
/// let err = breaker.execute(|| Ok::<u32, &str>(1)).unwrap_err();
/// assert!(err.is_rejection());
/// ```
pub struct CircuitBreaker {
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    core: Mutex<BreakerCore>,
    rejected: AtomicU64,
    last_success: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl CircuitBreaker {
    /// Create a breaker on the system clock.
    pub fn new(config: BreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a breaker reading time from `clock`.
    pub fn with_clock(config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let metrics = Metrics::new(config.name());
        let core = BreakerCore::new(&config, clock.now());
        Self {
            config,
            clock,
            metrics,
            core: Mutex::new(core),
            rejected: AtomicU64::new(0),
            last_success: Mutex::new(None),
        }
    }

    /// Share counters with an existing metrics handle.
    pub(crate) fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Breaker configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn core(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current state, moving OPEN to HALF_OPEN if the wait elapsed.
    pub fn state(&self) -> CircuitState {
        let now = self.clock.now();
        let mut core = self.core();
        self.refresh(&mut core, now);
        core.state
    }

    /// Calls rejected since creation or the last reset.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> Vec<StateTransition> {
        self.core().history.iter().copied().collect()
    }

    /// Get a snapshot of the breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let now = self.clock.now();
        let mut core = self.core();
        self.refresh(&mut core, now);
        core.window.evict(now);
        BreakerSnapshot {
            name: self.name().to_owned(),
            state: core.state,
            total_calls: core.window.total_calls(),
            failed_calls: core.window.failed_calls(),
            slow_calls: core.window.slow_calls(),
            failure_rate: core.window.failure_rate(),
            slow_call_rate: core.window.slow_call_rate(),
            half_open_calls: core.half_open_calls,
            half_open_successes: core.half_open_successes,
            rejected: self.rejected(),
            in_state_for: now.saturating_duration_since(core.last_state_change),
        }
    }

    /// Ask to run one call.
    ///
    /// CLOSED always admits. OPEN rejects until the wait elapses. HALF_OPEN
    /// admits up to the permitted number of trial calls and rejects the rest.
    /// A rejection is counted and returned; nothing is recorded in the
    /// window.
    pub fn try_acquire(&self) -> Result<CallPermit, Rejection> {
        let now = self.clock.now();
        let mut core = self.core();
        self.refresh(&mut core, now);

        let admitted = match core.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if core.half_open_calls < self.config.permitted_calls_in_half_open() {
                    core.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        };

        if admitted {
            self.metrics.record_allowed();
            return Ok(CallPermit {
                generation: core.generation,
                state: core.state,
                started: now,
            });
        }

        let retry_after_ms = match (core.state, core.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                let reopen = instant_after(opened_at, self.config.wait_duration());
                ceil_millis(reopen.saturating_duration_since(now)).max(1)
            }
            _ => 0,
        };
        let state = core.state;
        drop(core);

        self.rejected.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_denied();
        tracing::debug!(breaker = %self.name(), state = %state, retry_after_ms, "call rejected");
        Err(Rejection {
            state,
            retry_after_ms,
        })
    }

    /// Report a successful call.
    pub fn on_success(&self, permit: CallPermit, duration: Duration) {
        self.record(permit, true, duration, None);
    }

    /// Report a failed call.
    pub fn on_error(&self, permit: CallPermit, duration: Duration, error: impl fmt::Display) {
        self.record(permit, false, duration, Some(error.to_string()));
    }

    fn record(&self, permit: CallPermit, success: bool, duration: Duration, error: Option<String>) {
        let now = self.clock.now();
        let mut core = self.core();
        if permit.generation != core.generation {
            // Admitted under a state that no longer exists
            return;
        }

        match core.state {
            CircuitState::Closed => {
                let mut record =
                    CallRecord::new(success, duration, self.config.slow_call_duration(), now);
                if let Some(error) = error {
                    record = record.with_error(error);
                }
                core.window.record(record);
                core.window.evict(now);
                if self.should_open(&core) {
                    self.apply(&mut core, CircuitState::Open, TransitionCause::Threshold, now);
                }
            }
            CircuitState::HalfOpen => {
                if !success {
                    self.apply(&mut core, CircuitState::Open, TransitionCause::TrialFailed, now);
                } else {
                    core.half_open_successes += 1;
                    if core.half_open_successes >= self.config.permitted_calls_in_half_open() {
                        self.apply(
                            &mut core,
                            CircuitState::Closed,
                            TransitionCause::TrialsSucceeded,
                            now,
                        );
                    }
                }
            }
            CircuitState::Open => {}
        }
    }

    fn should_open(&self, core: &BreakerCore) -> bool {
        let window = &core.window;
        if window.total_calls() < self.config.minimum_calls() {
            return false;
        }
        window.failure_rate() >= self.config.failure_rate_threshold()
            || window.slow_call_rate() >= self.config.slow_call_rate_threshold()
    }

    /// Move OPEN to HALF_OPEN once the wait has elapsed.
    fn refresh(&self, core: &mut BreakerCore, now: Instant) {
        if core.state != CircuitState::Open {
            return;
        }
        let opened_at = core.opened_at.unwrap_or(core.last_state_change);
        if now.saturating_duration_since(opened_at) >= self.config.wait_duration() {
            self.apply(core, CircuitState::HalfOpen, TransitionCause::WaitElapsed, now);
        }
    }

    /// Apply a transition from the state table, logging one that is not in it.
    fn apply(&self, core: &mut BreakerCore, to: CircuitState, cause: TransitionCause, now: Instant) {
        if let Err(err) = self.transition(core, to, cause, now) {
            tracing::error!(breaker = %self.name(), error = %err, "circuit transition rejected");
            debug_assert!(false, "{}", err);
        }
    }

    fn transition(
        &self,
        core: &mut BreakerCore,
        to: CircuitState,
        cause: TransitionCause,
        now: Instant,
    ) -> Result<(), GovernorError> {
        let from = core.state;
        if cause != TransitionCause::Forced && !from.can_transition_to(to) {
            return Err(GovernorError::InvalidTransition {
                breaker: self.name().to_owned(),
                from,
                to,
            });
        }

        core.state = to;
        core.generation += 1;
        core.last_state_change = now;
        core.half_open_calls = 0;
        core.half_open_successes = 0;
        match to {
            CircuitState::Open => core.opened_at = Some(now),
            CircuitState::HalfOpen => {}
            CircuitState::Closed => {
                core.opened_at = None;
                core.window.reset();
            }
        }

        if core.history.len() == HISTORY_CAPACITY {
            core.history.pop_front();
        }
        core.history.push_back(StateTransition {
            from,
            to,
            cause,
            at: now,
        });
        self.metrics.record_state(to);

        if to == CircuitState::Open {
            tracing::warn!(
                breaker = %self.name(),
                from = %from,
                to = %to,
                cause = %cause,
                failure_rate = core.window.failure_rate(),
                slow_call_rate = core.window.slow_call_rate(),
                "circuit opened"
            );
        } else {
            tracing::info!(
                breaker = %self.name(),
                from = %from,
                to = %to,
                cause = %cause,
                "circuit state changed"
            );
        }
        Ok(())
    }

    /// Open the breaker now. It moves to HALF_OPEN after the wait like any
    /// other opening.
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut core = self.core();
        self.apply(&mut core, CircuitState::Open, TransitionCause::Forced, now);
    }

    /// Close the breaker now, clearing the window.
    pub fn force_close(&self) {
        let now = self.clock.now();
        let mut core = self.core();
        self.apply(&mut core, CircuitState::Closed, TransitionCause::Forced, now);
    }

    /// Return to the state of a freshly created breaker.
    ///
    /// In-flight calls admitted before the reset are not recorded.
    pub fn reset(&self) {
        let now = self.clock.now();
        {
            let mut core = self.core();
            let generation = core.generation + 1;
            *core = BreakerCore::new(&self.config, now);
            core.generation = generation;
        }
        self.rejected.store(0, Ordering::Relaxed);
        *self
            .last_success
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.metrics.record_state(CircuitState::Closed);
        tracing::info!(breaker = %self.name(), "circuit reset");
    }

    /// Run `operation` through the breaker.
    ///
    /// The duration is measured on the breaker's clock. An operation that
    /// panics is recorded as a failure before the panic continues.
    ///
    /// # Errors
    /// Under [`FallbackStrategy::Throw`] (and `Cache` with nothing cached)
    /// a rejection or operation error is returned as an [`ExecuteError`].
    pub fn execute<T, E, F>(&self, operation: F) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => return self.rejected_fallback(rejection),
        };
        let guard = InFlight::new(self, permit, "operation panicked");
        let result = operation();
        self.complete(guard, result)
    }

    /// Run a future through the breaker.
    ///
    /// The duration covers the whole await, suspension included. If the
    /// returned future is dropped before completing, the call is recorded
    /// as a failure with the duration observed up to the drop.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute).
    pub async fn execute_async<T, E, Fut>(
        &self,
        operation: Fut,
    ) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        let permit = match self.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => return self.rejected_fallback(rejection),
        };
        let guard = InFlight::new(self, permit, "operation cancelled");
        let result = operation.await;
        self.complete(guard, result)
    }

    fn complete<T, E>(
        &self,
        guard: InFlight<'_>,
        result: Result<T, E>,
    ) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        let permit = guard.finish();
        let duration = self.clock.now().saturating_duration_since(permit.started);
        match result {
            Ok(value) => {
                self.on_success(permit, duration);
                if self.config.fallback() == FallbackStrategy::Cache {
                    *self
                        .last_success
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(value.clone()));
                }
                Ok(CallOutcome::Success(value))
            }
            Err(err) => {
                self.on_error(permit, duration, &err);
                self.fallback(FallbackCause::Failed(err))
            }
        }
    }

    fn rejected_fallback<T, E>(
        &self,
        rejection: Rejection,
    ) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        self.fallback(FallbackCause::Rejected {
            state: rejection.state,
            retry_after_ms: rejection.retry_after_ms,
        })
    }

    /// Resolve a rejection or failure through the configured strategy.
    fn fallback<T, E>(&self, cause: FallbackCause<E>) -> Result<CallOutcome<T, E>, ExecuteError<E>>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
    {
        match self.config.fallback() {
            FallbackStrategy::Throw => Err(ExecuteError::from_cause(self.name(), cause)),
            FallbackStrategy::ReturnDefault => match self.config.fallback_value() {
                Some(value) => value.get::<T>().map(CallOutcome::Default).ok_or_else(|| {
                    ExecuteError::FallbackType {
                        breaker: self.name().to_owned(),
                    }
                }),
                None => Err(ExecuteError::from_cause(self.name(), cause)),
            },
            FallbackStrategy::Cache => {
                let cached = self
                    .last_success
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .as_ref()
                    .and_then(|value| value.downcast_ref::<T>().cloned());
                match cached {
                    Some(value) => Ok(CallOutcome::Cached(value)),
                    None => Err(ExecuteError::from_cause(self.name(), cause)),
                }
            }
            FallbackStrategy::Queue => Ok(CallOutcome::Queued(QueueAck {
                breaker: self.name().to_owned(),
                queued_at: self.clock.now(),
                reason: cause.to_string(),
            })),
            FallbackStrategy::Redirect => Ok(CallOutcome::Redirect(cause)),
        }
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name())
            .field("state", &self.core().state)
            .field("rejected", &self.rejected())
            .finish()
    }
}

/// An admitted call that has not reported its outcome yet.
///
/// Dropping it without [`finish`](Self::finish) (panic or cancellation)
/// records a failure.
struct InFlight<'a> {
    breaker: &'a CircuitBreaker,
    permit: CallPermit,
    finished: bool,
    abandoned: &'static str,
}

impl<'a> InFlight<'a> {
    fn new(breaker: &'a CircuitBreaker, permit: CallPermit, abandoned: &'static str) -> Self {
        Self {
            breaker,
            permit,
            finished: false,
            abandoned,
        }
    }

    fn finish(mut self) -> CallPermit {
        self.finished = true;
        self.permit
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let duration = self
            .breaker
            .clock
            .now()
            .saturating_duration_since(self.permit.started);
        tracing::debug!(breaker = %self.breaker.name(), reason = self.abandoned, "call abandoned");
        self.breaker.on_error(self.permit, duration, self.abandoned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fallback::FallbackStrategy;
    use crate::infrastructure::mocks::MockClock;

    fn breaker(config: BreakerConfig) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new(Instant::now());
        (CircuitBreaker::with_clock(config, Arc::new(clock.clone())), clock)
    }

    fn small_config() -> crate::domain::config::BreakerConfigBuilder {
        BreakerConfig::builder("test")
            .count_window(10)
            .minimum_calls(10)
            .failure_rate_threshold(50.0)
            .wait_duration(Duration::from_secs(5))
            .permitted_calls_in_half_open(2)
    }

    fn fail(cb: &CircuitBreaker) {
        let _ = cb.execute(|| Err::<u32, _>("boom"));
    }

    fn succeed(cb: &CircuitBreaker) {
        let _ = cb.execute(|| Ok::<u32, &str>(1));
    }

    fn open(cb: &CircuitBreaker) {
        for _ in 0..10 {
            fail(cb);
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_initial_state() {
        let (cb, _) = breaker(small_config().build().unwrap());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.rejected(), 0);
        assert!(cb.history().is_empty());
        assert!(cb.try_acquire().is_ok());
    }

    #[test]
    fn test_opens_at_threshold_after_minimum_calls() {
        let (cb, _) = breaker(small_config().build().unwrap());

        for _ in 0..5 {
            fail(&cb);
        }
        for _ in 0..4 {
            succeed(&cb);
        }
        // 9 calls: below minimum, never opens regardless of rate
        assert_eq!(cb.state(), CircuitState::Closed);

        succeed(&cb);
        // 10 calls, 50% failures
        assert_eq!(cb.state(), CircuitState::Open);
        let last = cb.history().pop().unwrap();
        assert_eq!(last.cause, TransitionCause::Threshold);
    }

    #[test]
    fn test_stays_closed_below_threshold() {
        let (cb, _) = breaker(small_config().build().unwrap());
        for _ in 0..4 {
            fail(&cb);
        }
        for _ in 0..6 {
            succeed(&cb);
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_slow_calls_open_the_circuit() {
        let config = small_config()
            .slow_call_duration(Duration::from_millis(100))
            .slow_call_rate_threshold(50.0)
            .build()
            .unwrap();
        let (cb, clock) = breaker(config);

        for _ in 0..10 {
            let result = cb.execute(|| {
                clock.advance(Duration::from_millis(150));
                Ok::<u32, &str>(1)
            });
            assert!(result.is_ok());
        }
        assert_eq!(cb.state(), CircuitState::Open);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.slow_calls, 10);
        assert_eq!(snapshot.failed_calls, 0);
    }

    #[test]
    fn test_open_rejects_without_running() {
        let (cb, clock) = breaker(small_config().build().unwrap());
        open(&cb);

        clock.advance(Duration::from_secs(2));
        let mut ran = false;
        let err = cb
            .execute(|| {
                ran = true;
                Ok::<u32, &str>(1)
            })
            .unwrap_err();
        assert!(!ran);
        match err {
            ExecuteError::CircuitOpen {
                state,
                retry_after_ms,
                ..
            } => {
                assert_eq!(state, CircuitState::Open);
                assert_eq!(retry_after_ms, 3_000);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(cb.rejected(), 1);
        assert_eq!(cb.metrics().denied(), 1);
    }

    #[test]
    fn test_half_open_recovery() {
        let (cb, clock) = breaker(small_config().build().unwrap());
        open(&cb);

        clock.advance(Duration::from_secs(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);

        // Window reset on close
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.total_calls, 0);
        assert_eq!(snapshot.failure_rate, 0.0);

        let causes: Vec<_> = cb.history().iter().map(|t| t.cause).collect();
        assert_eq!(
            causes,
            vec![
                TransitionCause::Threshold,
                TransitionCause::WaitElapsed,
                TransitionCause::TrialsSucceeded
            ]
        );
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (cb, clock) = breaker(small_config().build().unwrap());
        open(&cb);
        clock.advance(Duration::from_secs(5));

        succeed(&cb);
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(
            cb.history().last().map(|t| t.cause),
            Some(TransitionCause::TrialFailed)
        );

        // Wait restarts from the reopening
        clock.advance(Duration::from_secs(4));
        assert_eq!(cb.state(), CircuitState::Open);
        clock.advance(Duration::from_secs(1));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_limits_trial_calls() {
        let (cb, clock) = breaker(small_config().build().unwrap());
        open(&cb);
        clock.advance(Duration::from_secs(5));

        let first = cb.try_acquire().unwrap();
        let second = cb.try_acquire().unwrap();
        let third = cb.try_acquire().unwrap_err();
        assert_eq!(third.state, CircuitState::HalfOpen);
        assert_eq!(third.retry_after_ms, 0);

        cb.on_success(first, Duration::from_millis(1));
        cb.on_success(second, Duration::from_millis(1));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_stale_permit_is_ignored() {
        let (cb, _) = breaker(small_config().build().unwrap());
        let permit = cb.try_acquire().unwrap();
        cb.force_open();
        cb.force_close();

        cb.on_error(permit, Duration::from_millis(1), "late");
        assert_eq!(cb.snapshot().total_calls, 0);
    }

    #[test]
    fn test_force_open_and_close() {
        let (cb, clock) = breaker(small_config().build().unwrap());
        cb.force_open();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.try_acquire().is_err());

        // Forced open behaves like any other open
        clock.advance(Duration::from_secs(5));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.force_close();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb
            .history()
            .iter()
            .any(|t| t.cause == TransitionCause::Forced && t.to == CircuitState::Closed));
    }

    #[test]
    fn test_reset_returns_to_fresh_state() {
        let (cb, _) = breaker(small_config().build().unwrap());
        open(&cb);
        succeed(&cb);
        assert_eq!(cb.rejected(), 1);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.rejected(), 0);
        assert!(cb.history().is_empty());
        assert_eq!(cb.snapshot().total_calls, 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let (cb, _) = breaker(small_config().build().unwrap());
        for _ in 0..50 {
            cb.force_open();
            cb.force_close();
        }
        assert_eq!(cb.history().len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_time_window_forgets_old_failures() {
        let config = small_config()
            .time_window(Duration::from_secs(10))
            .minimum_calls(4)
            .build()
            .unwrap();
        let (cb, clock) = breaker(config);

        fail(&cb);
        fail(&cb);
        clock.advance(Duration::from_secs(11));
        fail(&cb);
        succeed(&cb);
        succeed(&cb);
        // Only 3 calls inside the window
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().total_calls, 3);
    }

    #[test]
    fn test_fallback_return_default() {
        let config = small_config()
            .fallback(FallbackStrategy::ReturnDefault)
            .fallback_value(42u32)
            .build()
            .unwrap();
        let (cb, _) = breaker(config);

        let outcome = cb.execute(|| Err::<u32, _>("boom")).unwrap();
        assert_eq!(outcome, CallOutcome::Default(42));

        // Wrong result type
        let err = cb.execute(|| Err::<String, _>("boom")).unwrap_err();
        assert!(matches!(err, ExecuteError::FallbackType { .. }));
    }

    #[test]
    fn test_fallback_cache() {
        let config = small_config()
            .fallback(FallbackStrategy::Cache)
            .build()
            .unwrap();
        let (cb, _) = breaker(config);

        // Nothing cached yet: surfaces the error
        let err = cb.execute(|| Err::<u32, _>("boom")).unwrap_err();
        assert_eq!(err.into_operation_error(), Some("boom"));

        assert_eq!(cb.execute(|| Ok::<u32, &str>(7)).unwrap(), CallOutcome::Success(7));
        assert_eq!(cb.execute(|| Err::<u32, _>("boom")).unwrap(), CallOutcome::Cached(7));
    }

    #[test]
    fn test_fallback_queue_and_redirect() {
        let (cb, clock) = breaker(
            small_config()
                .fallback(FallbackStrategy::Queue)
                .build()
                .unwrap(),
        );
        match cb.execute(|| Err::<u32, _>("boom")).unwrap() {
            CallOutcome::Queued(ack) => {
                assert_eq!(ack.breaker, "test");
                assert_eq!(ack.queued_at, clock.now());
                assert_eq!(ack.reason, "operation failed: boom");
            }
            other => panic!("expected queued, got {:?}", other),
        }

        let (cb, _) = breaker(
            small_config()
                .fallback(FallbackStrategy::Redirect)
                .build()
                .unwrap(),
        );
        let outcome = cb.execute(|| Err::<u32, _>("boom")).unwrap();
        assert_eq!(outcome, CallOutcome::Redirect(FallbackCause::Failed("boom")));

        cb.force_open();
        let outcome = cb.execute(|| Ok::<u32, &str>(1)).unwrap();
        assert!(matches!(
            outcome,
            CallOutcome::Redirect(FallbackCause::Rejected {
                state: CircuitState::Open,
                ..
            })
        ));
    }

    #[test]
    fn test_panic_is_recorded_as_failure() {
        let (cb, _) = breaker(small_config().minimum_calls(1).count_window(1).build().unwrap());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = cb.execute(|| -> Result<u32, &str> { panic!("bug") });
        }));
        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_concurrent_calls_keep_window_consistent() {
        use std::thread;

        let cb = Arc::new(CircuitBreaker::new(
            BreakerConfig::builder("concurrent")
                .count_window(1000)
                .minimum_calls(1000)
                .build()
                .unwrap(),
        ));
        let mut handles = vec![];
        for i in 0..8 {
            let cb = Arc::clone(&cb);
            handles.push(thread::spawn(move || {
                for j in 0..50 {
                    let _ = cb.execute(|| if (i + j) % 4 == 0 { Err("x") } else { Ok(1u8) });
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.total_calls, 400);
        assert_eq!(snapshot.failed_calls, 100);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }
}
