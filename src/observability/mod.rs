//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Engine and stores produce:
//!     → tracing events (transitions, conflicts, store failures)
//!     → metrics.rs (counters)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → whatever metrics exporter the host installs
//! ```
//!
//! # Design Decisions
//! - Structured fields: circuit, attempt, version, from/to
//! - Metrics are cheap and optional

pub mod logging;
pub mod metrics;
