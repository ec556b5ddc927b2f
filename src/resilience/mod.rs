//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Protected call:
//!     → guard.rs (Safeguarded::call)
//!     → circuit_breaker.rs permit(key)
//!         → timeouts.rs (deadline on every store call)
//!         → state.rs (decide)
//!         → retries.rs / backoff.rs (on version conflict)
//!     → invoke operation (skipped on REJECT)
//!     → circuit_breaker.rs record_outcome(key, outcome)
//!         → state.rs (apply_outcome)
//! ```
//!
//! # Design Decisions
//! - State lives in the store, never in the process
//! - Optimistic concurrency: conditional writes on a version token, no locks
//! - Time is evaluated at decision time; no background timers
//! - Exactly one probe per half-open circuit

pub mod backoff;
pub mod circuit_breaker;
pub mod guard;
pub mod retries;
pub mod state;
pub mod timeouts;
pub mod types;

pub use circuit_breaker::CircuitBreaker;
pub use guard::{GuardError, Safeguarded};
pub use types::{BreakerError, BreakerResult, Decision, Degradation, Outcome, Permit};
