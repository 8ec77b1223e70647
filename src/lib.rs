//! # traffic-governor
//!
//! Rate limiting and circuit breaking for protecting a service from overload
//! and cascading failure.
//!
//! The crate provides two primitives, both driven by sliding-window call
//! statistics, and a registry that owns them by name:
//! - **Rate limiters** decide per identifier (user, IP, API key, ...)
//!   whether a call may proceed, using one of five algorithms.
//! - **Circuit breakers** wrap calls to a dependency, stop calling it once
//!   its failure or slow-call rate crosses a threshold, and probe for
//!   recovery after a wait.
//!
//! ## Quick Start
//!
//! ```rust
//! use traffic_governor::{
//!     AlgorithmConfig, BreakerConfig, CallOutcome, GovernorRegistry, LimiterConfig,
//! };
//! use std::time::Duration;
//!
//! let registry = GovernorRegistry::new();
//!
//! // 10 calls per user per minute, counted exactly
//! registry.create_config(LimiterConfig::new(
//!     "api",
//!     AlgorithmConfig::sliding_window_log(10, Duration::from_secs(60)).unwrap(),
//! ).unwrap());
//!
//! let result = registry.evaluate("api", "user-42").unwrap();
//! if !result.is_allowed() {
//!     println!("retry in {}ms", result.retry_after_ms);
//! }
//!
//! // Open after half of at least 20 calls fail
//! registry.create_config(
//!     BreakerConfig::builder("payments")
//!         .failure_rate_threshold(50.0)
//!         .minimum_calls(20)
//!         .wait_duration(Duration::from_secs(30))
//!         .build()
//!         .unwrap(),
//! );
//!
//! let outcome: CallOutcome<u32, String> = registry
//!     .execute("payments", || Ok::<u32, String>(200))
//!     .unwrap();
//! assert_eq!(outcome.into_value(), Some(200));
//! ```
//!
//! ## Rate Limiting Algorithms
//!
//! | Algorithm | Behavior |
//! |-----------|----------|
//! | [`AlgorithmConfig::token_bucket`] | Burst up to `capacity`, refill at a steady rate |
//! | [`AlgorithmConfig::sliding_window_log`] | Exactly `limit` calls in any window-long span |
//! | [`AlgorithmConfig::sliding_window_counter`] | O(1) weighted approximation of the log |
//! | [`AlgorithmConfig::fixed_window_counter`] | `limit` per aligned window; up to `2 * limit` across a boundary |
//! | [`AlgorithmConfig::leaky_bucket`] | Queue of `capacity` drained at a constant rate |
//!
//! A denial is never an error. [`EvaluationResult`] carries the decision,
//! the remaining allowance and a retry hint in milliseconds, and a denied
//! call consumes nothing.
//!
//! [`LimitScope`] controls how identifiers map to entries: `Global` shares
//! one entry between all callers, the other scopes keep one per identifier.
//!
//! ## Circuit Breaker
//!
//! A breaker is CLOSED until the window holds at least `minimum_calls` and
//! either the failure rate or the slow-call rate reaches its threshold. It
//! then rejects every call for `wait_duration`, moves to HALF_OPEN and
//! admits `permitted_calls_in_half_open` trial calls. All trials succeeding
//! closes it with a fresh window; any trial failing opens it again.
//!
//! What a caller sees on rejection or failure is set by the
//! [`FallbackStrategy`]:
//!
//! ```rust
//! use traffic_governor::{BreakerConfig, CallOutcome, FallbackStrategy, GovernorRegistry};
//!
//! let registry = GovernorRegistry::new();
//! registry.create_config(
//!     BreakerConfig::builder("recommendations")
//!         .fallback(FallbackStrategy::ReturnDefault)
//!         .fallback_value(Vec::<String>::new())
//!         .build()
//!         .unwrap(),
//! );
//!
//! let outcome: CallOutcome<Vec<String>, &str> = registry
//!     .execute("recommendations", || Err("timeout"))
//!     .unwrap();
//! assert!(outcome.is_fallback());
//! assert_eq!(outcome.into_value(), Some(Vec::new()));
//! ```
//!
//! [`GovernorRegistry::execute_async`] wraps a future instead. A future
//! dropped before completing is recorded as a failed call.
//!
//! ## Observability
//!
//! Counts are available per config through [`GovernorRegistry::metrics`]:
//!
//! ```rust
//! # use traffic_governor::{AlgorithmConfig, GovernorRegistry, LimiterConfig};
//! # let registry = GovernorRegistry::new();
//! # registry.create_config(
//! #     LimiterConfig::new("api", AlgorithmConfig::token_bucket(1, 1.0).unwrap()).unwrap(),
//! # );
//! registry.evaluate("api", "alice").unwrap();
//! registry.evaluate("api", "alice").unwrap();
//!
//! let metrics = registry.metrics("api").unwrap();
//! assert_eq!(metrics.allowed, 1);
//! assert_eq!(metrics.denied, 1);
//! ```
//!
//! The same counters are mirrored into the [`metrics`](https://docs.rs/metrics)
//! facade under the names in [`application::metrics::names`]. Nothing is
//! exported unless the application installs a recorder. State transitions,
//! resets and config replacement are logged through `tracing`.
//!
//! ## Memory Management
//!
//! Each limiter tracks at most 10,000 identifiers by default, evicting the
//! least recently used. Idle entries can also be swept by age:
//!
//! ```rust
//! use traffic_governor::GovernorRegistry;
//! use std::time::Duration;
//!
//! let registry = GovernorRegistry::builder()
//!     .with_max_entries(50_000)
//!     .with_idle_ttl(Duration::from_secs(600))
//!     .build()
//!     .unwrap();
//!
//! // Call periodically, or run an `IdleSweeper` with the `async` feature
//! let removed = registry.sweep_expired();
//! assert_eq!(removed, 0);
//! ```
//!
//! ## Feature Flags
//!
//! - `async`: the background `IdleSweeper` (requires a tokio runtime)
//! - `serde`: `Serialize`/`Deserialize` on exported value types
//! - `test-helpers`: exposes `infrastructure::mocks` for downstream tests

// Domain layer - pure algorithms and value types
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    algorithm::{
        AlgorithmConfig, AlgorithmKind, AlgorithmState, LeakyBucketConfig, RateLimitAlgorithm,
        TokenBucketConfig, WindowConfig,
    },
    config::{
        BreakerConfig, BreakerConfigBuilder, ConfigError, GovernorConfig, LimitScope,
        LimiterConfig,
    },
    decision::{Decision, EvaluationResult},
    fallback::{CallOutcome, FallbackCause, FallbackStrategy, FallbackValue, QueueAck},
    state::{CircuitState, StateTransition, TransitionCause},
    window::{CallRecord, SlidingWindow, WindowType},
};

pub use application::{
    circuit_breaker::{BreakerSnapshot, CallPermit, CircuitBreaker, Rejection},
    error::{ExecuteError, GovernorError},
    limiter::{LimiterEntry, RateLimiter},
    metrics::{GovernorMetrics, Metrics, MetricsSnapshot},
    ports::{Clock, EvictionCandidate, EvictionPolicy, Storage},
    registry::{ConfigHandle, GovernorRegistry, GovernorRegistryBuilder},
};

#[cfg(feature = "async")]
pub use application::sweeper::{IdleSweeper, ShutdownError, SweeperConfig, SweeperHandle};

pub use infrastructure::{clock::SystemClock, eviction::LruEviction, storage::ShardedStorage};
