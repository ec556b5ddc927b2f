//! Distributed circuit breaker for stateless invocations.
//!
//! Breaker state (status, failure counter, probe flag) lives in a shared
//! store and is only changed through version-checked writes, so any number of
//! short-lived invocations can coordinate on one circuit without sharing
//! memory.

pub mod clock;
pub mod config;
pub mod observability;
pub mod resilience;
pub mod store;

pub use config::BreakerConfig;
pub use resilience::{CircuitBreaker, Decision, Outcome, Permit, Safeguarded};
pub use store::{CircuitRecord, CircuitStatus, StateStore};
