//! Persisted circuit state and store error definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Status of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "CLOSED",
            CircuitStatus::Open => "OPEN",
            CircuitStatus::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CLOSED" => Ok(CircuitStatus::Closed),
            "OPEN" => Ok(CircuitStatus::Open),
            "HALF_OPEN" => Ok(CircuitStatus::HalfOpen),
            other => Err(StoreError::Corrupt(format!("unknown circuit status '{}'", other))),
        }
    }
}

/// Optimistic concurrency token.
///
/// Versions start at 1 for a freshly created record and every accepted
/// conditional write stores `expected + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// The persisted unit of state for one circuit key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitRecord {
    /// Identifier of the protected dependency.
    pub key: String,
    pub status: CircuitStatus,
    /// Consecutive failures; only meaningful while `Closed`.
    pub failure_count: u32,
    /// Most recent status change (or probe grant while half-open).
    pub last_transition_at: DateTime<Utc>,
    /// True only while half-open with a trial call outstanding.
    pub probe_in_flight: bool,
    /// Display text of the failure that last counted against the circuit.
    pub last_failure: Option<String>,
    /// Store-level retention; an expired record reads as absent.
    pub expires_at: Option<DateTime<Utc>>,
    /// Version this record was read at (or written as).
    pub version: Version,
}

impl CircuitRecord {
    /// A fresh closed record, as created lazily on first access.
    pub fn closed(key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            status: CircuitStatus::Closed,
            failure_count: 0,
            last_transition_at: now,
            probe_in_flight: false,
            last_failure: None,
            expires_at: None,
            version: Version::INITIAL,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Errors surfaced by a state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stored version no longer matches the version the write was based on.
    #[error("version conflict on '{key}': expected {expected}")]
    VersionConflict { key: String, expected: Version },

    /// Connectivity or backend failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The operation exceeded its deadline.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// A stored item could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The store was set up with unusable parameters.
    #[error("invalid store configuration: {0}")]
    Configuration(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
                StoreError::Corrupt(err.to_string())
            }
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("HALF_OPEN".parse::<CircuitStatus>().unwrap(), CircuitStatus::HalfOpen);
        assert_eq!(CircuitStatus::Open.to_string(), "OPEN");
        assert!(matches!(
            "ajar".parse::<CircuitStatus>(),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_record_expiry() {
        let now = Utc::now();
        let mut record = CircuitRecord::closed("db", now);
        assert!(!record.is_expired(now));

        record.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(record.is_expired(now));

        record.expires_at = Some(now + chrono::Duration::seconds(1));
        assert!(!record.is_expired(now));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = CircuitRecord::closed("db", Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "CLOSED");
        assert_eq!(json["failureCount"], 0);
        assert_eq!(json["probeInFlight"], false);
    }
}
