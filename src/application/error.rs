//! Errors surfaced by the registry and by breaker execution.
//!
//! Rate limiting denials are not errors: they are returned as
//! [`EvaluationResult`](crate::domain::decision::EvaluationResult) data.

use crate::domain::fallback::FallbackCause;
use crate::domain::state::CircuitState;
use std::fmt;

/// Registry-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernorError {
    /// No config is registered under this name
    #[error("no config registered under '{0}'")]
    ConfigNotFound(String),
    /// The name refers to a config of the other kind
    #[error("config '{name}' is a {actual}, expected a {expected}")]
    KindMismatch {
        /// Config name
        name: String,
        /// Kind the operation needs
        expected: &'static str,
        /// Kind that is registered
        actual: &'static str,
    },
    /// A transition outside the breaker state table was attempted
    #[error("invalid circuit transition {from} -> {to} on '{breaker}'")]
    InvalidTransition {
        /// Breaker name
        breaker: String,
        /// Current state
        from: CircuitState,
        /// Requested state
        to: CircuitState,
    },
}

/// What a breaker surfaces when the fallback strategy does not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    /// The wrapped operation failed
    #[error("operation failed: {0}")]
    Operation(E),
    /// The breaker rejected the call without running it
    #[error("circuit '{breaker}' is {state}, retry after {retry_after_ms}ms")]
    CircuitOpen {
        /// Breaker name
        breaker: String,
        /// State at rejection
        state: CircuitState,
        /// Milliseconds until the breaker may admit calls again
        retry_after_ms: u64,
    },
    /// The configured fallback value does not have the operation's result type
    #[error("fallback value of '{breaker}' does not match the operation result type")]
    FallbackType {
        /// Breaker name
        breaker: String,
    },
    /// Registry lookup failed
    #[error(transparent)]
    Governor(#[from] GovernorError),
}

impl<E> ExecuteError<E> {
    /// Turn a fallback cause into the error surfaced under `Throw`.
    pub(crate) fn from_cause(breaker: &str, cause: FallbackCause<E>) -> Self {
        match cause {
            FallbackCause::Failed(err) => ExecuteError::Operation(err),
            FallbackCause::Rejected {
                state,
                retry_after_ms,
            } => ExecuteError::CircuitOpen {
                breaker: breaker.to_owned(),
                state,
                retry_after_ms,
            },
        }
    }

    /// Check if the breaker rejected the call.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ExecuteError::CircuitOpen { .. })
    }

    /// The operation's own error, if it ran and failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            ExecuteError::Operation(err) => Some(err),
            _ => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for FallbackCause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackCause::Failed(err) => write!(f, "operation failed: {}", err),
            FallbackCause::Rejected {
                state,
                retry_after_ms,
            } => write!(f, "rejected while {}, retry after {}ms", state, retry_after_ms),
        }
    }
}
