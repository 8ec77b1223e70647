//! Fallback strategies and the outcomes callers observe.
//!
//! Rejections by an open breaker and failures of the wrapped operation go
//! through the same strategy, so a caller has one place to handle degraded
//! behavior.

use crate::domain::state::CircuitState;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// What a breaker hands back when a call is rejected or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FallbackStrategy {
    /// Surface the error
    #[default]
    Throw,
    /// Return the configured fallback value
    ReturnDefault,
    /// Return the last successful result, or surface the error if there is none
    Cache,
    /// Return an acknowledgement for deferred handling
    Queue,
    /// Return a marker carrying the original cause
    Redirect,
}

/// Type-erased value returned under [`FallbackStrategy::ReturnDefault`].
#[derive(Clone)]
pub struct FallbackValue(Arc<dyn Any + Send + Sync>);

impl FallbackValue {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Clone the value out if it has type `T`.
    pub fn get<T: Any + Clone>(&self) -> Option<T> {
        self.0.downcast_ref::<T>().cloned()
    }
}

impl fmt::Debug for FallbackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FallbackValue(..)")
    }
}

/// Why a fallback was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackCause<E> {
    /// The operation ran and failed
    Failed(E),
    /// The breaker did not run the operation
    Rejected {
        /// Breaker state at rejection
        state: CircuitState,
        /// Milliseconds until the breaker may admit calls again
        retry_after_ms: u64,
    },
}

/// Acknowledgement returned under [`FallbackStrategy::Queue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAck {
    /// Breaker that deferred the call
    pub breaker: String,
    /// When the call was deferred
    pub queued_at: Instant,
    /// Description of the failure or rejection
    pub reason: String,
}

/// Result of running an operation through a breaker.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T, E> {
    /// The operation ran and succeeded
    Success(T),
    /// The configured fallback value
    Default(T),
    /// The last successful result
    Cached(T),
    /// The call was deferred
    Queued(QueueAck),
    /// The caller should send the call elsewhere
    Redirect(FallbackCause<E>),
}

impl<T, E> CallOutcome<T, E> {
    /// Check if the operation itself succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Check if a fallback was applied.
    pub fn is_fallback(&self) -> bool {
        !self.is_success()
    }

    /// The value carried by `Success`, `Default` or `Cached`.
    pub fn into_value(self) -> Option<T> {
        match self {
            CallOutcome::Success(v) | CallOutcome::Default(v) | CallOutcome::Cached(v) => Some(v),
            CallOutcome::Queued(_) | CallOutcome::Redirect(_) => None,
        }
    }
}
