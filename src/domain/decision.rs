//! Admission decisions.

use std::time::{Duration, Instant};

/// Whether a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Decision {
    /// The call may proceed
    Allow,
    /// The call was turned away
    Deny,
}

impl Decision {
    /// Check if this decision is Allow.
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Check if this decision is Deny.
    pub fn is_deny(&self) -> bool {
        matches!(self, Decision::Deny)
    }
}

/// Outcome of one admission check.
///
/// A denial is ordinary data, not an error: callers branch on
/// [`is_allowed`](Self::is_allowed) and use [`retry_after_ms`](Self::retry_after_ms)
/// to shape their response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationResult {
    /// Allow or deny
    pub decision: Decision,
    /// Calls still admissible right now, after this one
    pub remaining: u64,
    /// When the limiter is back to full capacity (or the current window ends)
    pub reset_at: Instant,
    /// Milliseconds until a retry can succeed; zero when allowed
    pub retry_after_ms: u64,
}

impl EvaluationResult {
    /// An admitted call.
    pub fn allowed(remaining: u64, reset_at: Instant) -> Self {
        Self {
            decision: Decision::Allow,
            remaining,
            reset_at,
            retry_after_ms: 0,
        }
    }

    /// A denied call. The retry hint is rounded up so waiting exactly that
    /// long is always enough, and is never zero.
    pub fn denied(retry_after: Duration, reset_at: Instant) -> Self {
        Self {
            decision: Decision::Deny,
            remaining: 0,
            reset_at,
            retry_after_ms: ceil_millis(retry_after).max(1),
        }
    }

    /// Check if the call was admitted.
    pub fn is_allowed(&self) -> bool {
        self.decision.is_allow()
    }

    /// The retry hint as a `Duration`.
    pub fn retry_after(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms)
    }
}

/// Round a duration up to whole milliseconds.
pub(crate) fn ceil_millis(duration: Duration) -> u64 {
    let nanos = duration.as_nanos();
    let millis = nanos.div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX)
}

/// Cap used when an instant would not fit the platform clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// `base + offset`, clamped to a far-future instant instead of overflowing.
pub(crate) fn instant_after(base: Instant, offset: Duration) -> Instant {
    base.checked_add(offset)
        .or_else(|| base.checked_add(FAR_FUTURE))
        .unwrap_or(base)
}

/// Convert fractional seconds to a `Duration`, saturating on overflow.
pub(crate) fn secs_f64(secs: f64) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_helpers() {
        assert!(Decision::Allow.is_allow());
        assert!(!Decision::Allow.is_deny());
        assert!(Decision::Deny.is_deny());
    }

    #[test]
    fn test_denied_rounds_up() {
        let now = Instant::now();
        let result = EvaluationResult::denied(Duration::from_micros(1500), now);
        assert_eq!(result.retry_after_ms, 2);
        assert!(!result.is_allowed());
        assert_eq!(result.remaining, 0);

        let result = EvaluationResult::denied(Duration::ZERO, now);
        assert_eq!(result.retry_after_ms, 1);
    }

    #[test]
    fn test_allowed() {
        let now = Instant::now();
        let result = EvaluationResult::allowed(4, now);
        assert!(result.is_allowed());
        assert_eq!(result.remaining, 4);
        assert_eq!(result.retry_after(), Duration::ZERO);
    }

    #[test]
    fn test_instant_after_clamps_overflow() {
        let now = Instant::now();
        assert_eq!(instant_after(now, Duration::from_secs(5)), now + Duration::from_secs(5));

        let clamped = instant_after(now, Duration::MAX);
        assert!(clamped > now + Duration::from_secs(365 * 24 * 60 * 60));
        assert!(ceil_millis(clamped.saturating_duration_since(now)) < u64::MAX);
    }

    #[test]
    fn test_secs_f64_edge_cases() {
        assert_eq!(secs_f64(-1.0), Duration::ZERO);
        assert_eq!(secs_f64(f64::NAN), Duration::ZERO);
        assert_eq!(secs_f64(f64::INFINITY), Duration::ZERO);
        assert_eq!(secs_f64(0.5), Duration::from_millis(500));
    }
}
