//! Engine-facing types and error definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::validation::ValidationError;
use crate::store::StoreError;

/// Answer to "may I call the dependency now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Circuit closed; call normally.
    Allow,
    /// This caller holds the single trial call of a half-open circuit.
    AllowAsProbe,
    /// Do not call; apply a fallback.
    Reject,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Reject)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Allow => "ALLOW",
            Decision::AllowAsProbe => "ALLOW_AS_PROBE",
            Decision::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a protected call as reported back to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "SUCCESS",
            Outcome::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a decision was made without full coordination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// The store could not be reached; the decision follows the fail-open/closed policy.
    StoreUnavailable(String),
    /// Every attempt lost a version race; the call is rejected.
    ContentionExhausted { attempts: u32 },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::StoreUnavailable(reason) => write!(f, "store unavailable: {}", reason),
            Degradation::ContentionExhausted { attempts } => {
                write!(f, "version conflicts on all {} attempts", attempts)
            }
        }
    }
}

/// A decision plus, when coordination failed, the reason.
///
/// Callers that only care about the decision can ignore `degraded`; callers
/// that alert operators inspect it to tell a real open circuit from a store
/// outage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permit {
    pub decision: Decision,
    pub degraded: Option<Degradation>,
}

impl Permit {
    pub fn decided(decision: Decision) -> Self {
        Self {
            decision,
            degraded: None,
        }
    }

    pub fn degraded(decision: Decision, reason: Degradation) -> Self {
        Self {
            decision,
            degraded: Some(reason),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision.is_allowed()
    }

    pub fn is_probe(&self) -> bool {
        self.decision == Decision::AllowAsProbe
    }
}

/// Errors produced by the breaker engine.
#[derive(Debug, Error)]
pub enum BreakerError {
    /// Rejected at construction.
    #[error("invalid configuration: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    InvalidConfiguration(Vec<ValidationError>),

    /// The store failed or timed out.
    #[error("store unavailable for circuit '{key}': {source}")]
    StoreUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Every read-decide-write attempt lost a version race.
    #[error("circuit '{key}' still contended after {attempts} attempts")]
    ContentionExhausted { key: String, attempts: u32 },
}

/// Result type for engine operations.
pub type BreakerResult<T> = Result<T, BreakerError>;
