//! Domain layer - pure business logic with no external dependencies.
//!
//! This layer contains the core concepts and invariants of traffic governance:
//! - Admission algorithms and their decisions
//! - Sliding-window call statistics
//! - Circuit breaker states and fallback outcomes
//! - Validated configurations
//!
//! All types in this layer are pure and take time as an argument, so they are
//! easily testable.

pub mod algorithm;
pub mod config;
pub mod decision;
pub mod fallback;
pub mod state;
pub mod window;

