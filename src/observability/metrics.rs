//! Breaker metrics.
//!
//! # Metrics
//! - `breaker_decisions_total` (counter): permits by circuit, decision
//! - `breaker_outcomes_total` (counter): reported outcomes by circuit, outcome
//! - `breaker_transitions_total` (counter): status changes by circuit, from, to
//! - `breaker_version_conflicts_total` (counter): lost write races by circuit
//! - `breaker_store_errors_total` (counter): store failures by operation
//!
//! Emitted through the `metrics` facade; installing an exporter is left to
//! the host process. Without one these calls are no-ops.

use metrics::counter;

use crate::resilience::types::{Decision, Outcome};
use crate::store::CircuitStatus;

pub fn record_decision(circuit: &str, decision: Decision) {
    counter!(
        "breaker_decisions_total",
        "circuit" => circuit.to_string(),
        "decision" => decision.as_str()
    )
    .increment(1);
}

pub fn record_outcome(circuit: &str, outcome: Outcome) {
    counter!(
        "breaker_outcomes_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_transition(circuit: &str, from: CircuitStatus, to: CircuitStatus) {
    counter!(
        "breaker_transitions_total",
        "circuit" => circuit.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_version_conflict(circuit: &str) {
    counter!("breaker_version_conflicts_total", "circuit" => circuit.to_string()).increment(1);
}

pub fn record_store_error(operation: &'static str) {
    counter!("breaker_store_errors_total", "operation" => operation).increment(1);
}
