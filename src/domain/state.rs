//! Circuit breaker states and transitions.

use std::fmt;
use std::time::Instant;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CircuitState {
    /// Calls flow through and are recorded
    Closed = 0,
    /// Calls are rejected without running
    Open = 1,
    /// A limited number of trial calls test recovery
    HalfOpen = 2,
}

impl CircuitState {
    /// Gauge value: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(&self) -> f64 {
        *self as u8 as f64
    }

    /// Check whether `self -> to` is a legal transition.
    ///
    /// Forced transitions are checked separately; they may go anywhere.
    pub fn can_transition_to(&self, to: CircuitState) -> bool {
        matches!(
            (self, to),
            (CircuitState::Closed, CircuitState::Open)
                | (CircuitState::Open, CircuitState::HalfOpen)
                | (CircuitState::HalfOpen, CircuitState::Open)
                | (CircuitState::HalfOpen, CircuitState::Closed)
        )
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(name)
    }
}

/// Why a breaker changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransitionCause {
    /// Failure or slow-call rate crossed its threshold
    Threshold,
    /// The open wait elapsed
    WaitElapsed,
    /// A half-open trial call failed
    TrialFailed,
    /// Enough half-open trial calls succeeded
    TrialsSucceeded,
    /// `force_open` / `force_close`
    Forced,
}

impl fmt::Display for TransitionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransitionCause::Threshold => "threshold",
            TransitionCause::WaitElapsed => "wait_elapsed",
            TransitionCause::TrialFailed => "trial_failed",
            TransitionCause::TrialsSucceeded => "trials_succeeded",
            TransitionCause::Forced => "forced",
        };
        f.write_str(name)
    }
}

/// One entry of a breaker's transition history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// State before
    pub from: CircuitState,
    /// State after
    pub to: CircuitState,
    /// What triggered it
    pub cause: TransitionCause,
    /// When it happened
    pub at: Instant,
}
