//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, timeouts > 0)
//! - Reject combinations that break the state machine (TTL shorter than the open window or probe lease)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BreakerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::{BreakerConfig, CircuitPolicy, StoreBackend};
use crate::store::sqlite::is_identifier;

/// A single semantic problem, located by dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a whole configuration.
pub fn validate_config(config: &BreakerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    collect_policy_errors("circuit", &config.circuit, &mut errors);
    let mut keys: Vec<_> = config.circuits.keys().collect();
    keys.sort();
    for key in keys {
        if key.is_empty() {
            errors.push(ValidationError::new("circuits", "circuit key must not be empty"));
        }
        collect_policy_errors(&format!("circuits.{}", key), &config.circuits[key], &mut errors);
    }

    let store = &config.store;
    if store.backend == StoreBackend::Sqlite {
        if store.url.trim().is_empty() {
            errors.push(ValidationError::new("store.url", "required for the sqlite backend"));
        }
        if !is_identifier(&store.table) {
            errors.push(ValidationError::new(
                "store.table",
                format!("'{}' is not a valid table name", store.table),
            ));
        }
        if store.max_connections == 0 {
            errors.push(ValidationError::new("store.max_connections", "must be greater than 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one circuit policy.
pub fn validate_policy(policy: &CircuitPolicy) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    collect_policy_errors("circuit", policy, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn collect_policy_errors(path: &str, policy: &CircuitPolicy, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("{}.{}", path, name);

    if policy.failure_threshold == 0 {
        errors.push(ValidationError::new(field("failure_threshold"), "must be greater than 0"));
    }
    if policy.open_timeout_secs == 0 {
        errors.push(ValidationError::new(field("open_timeout_secs"), "must be greater than 0"));
    }
    if policy.probe_timeout_secs == Some(0) {
        errors.push(ValidationError::new(field("probe_timeout_secs"), "must be greater than 0"));
    }
    if policy.store_timeout_ms == 0 {
        errors.push(ValidationError::new(field("store_timeout_ms"), "must be greater than 0"));
    }
    if policy.retry_backoff_max_ms < policy.retry_backoff_base_ms {
        errors.push(ValidationError::new(
            field("retry_backoff_max_ms"),
            "must not be smaller than retry_backoff_base_ms",
        ));
    }
    if let Some(ttl) = policy.record_ttl_secs {
        // The record must outlive the open window and any outstanding probe.
        let longest = policy
            .open_timeout_secs
            .max(policy.probe_timeout_secs.unwrap_or(policy.open_timeout_secs));
        if ttl <= longest {
            errors.push(ValidationError::new(
                field("record_ttl_secs"),
                format!("must exceed the open and probe timeouts ({}s)", longest),
            ));
        }
    }
}
