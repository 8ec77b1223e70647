//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages runtime state:
//! - Rate limiter (per-identifier admission decisions)
//! - Circuit breaker (call protocol, transitions, fallbacks)
//! - Governor registry (named configs and lazily created state)
//! - Idle sweeper (background cleanup, `async` feature)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod circuit_breaker;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod registry;

#[cfg(feature = "async")]
pub mod sweeper;
