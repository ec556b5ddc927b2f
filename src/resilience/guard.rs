//! Call interception.
//!
//! Wraps a protected async operation: asks the engine for a permit, skips
//! the call when rejected, runs it otherwise, and reports the outcome exactly
//! once. The operation's own error is handed back untouched.
//!
//! ```ignore
//! let guard = Safeguarded::new(breaker, "payments-api")
//!     .tripped_by(|e: &ApiError| e.is_server_side());
//!
//! match guard.call(|| client.charge(order)).await {
//!     Ok(receipt) => ...,
//!     Err(GuardError::Open { .. }) => fallback(),
//!     Err(GuardError::Inner(e)) => return Err(e),
//! }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::resilience::types::{Decision, Degradation, Outcome};

/// Why a guarded call did not produce a value.
#[derive(Debug, Error)]
pub enum GuardError<E> {
    /// The circuit is open (or half-open with a probe already out); the call was skipped.
    #[error("circuit '{key}' is open")]
    Open { key: String },

    /// The call was skipped because coordination state could not be obtained.
    #[error("circuit '{key}' rejected call: {reason}")]
    Unavailable { key: String, reason: Degradation },

    /// The protected operation itself failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> GuardError<E> {
    /// True when the protected operation never ran.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, GuardError::Inner(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            GuardError::Inner(e) => Some(e),
            _ => None,
        }
    }
}

type TripPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// A protected call site bound to one circuit.
pub struct Safeguarded<E> {
    breaker: CircuitBreaker,
    key: String,
    trips: Option<TripPredicate<E>>,
}

impl<E> Clone for Safeguarded<E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            key: self.key.clone(),
            trips: self.trips.clone(),
        }
    }
}

impl<E: Display> Safeguarded<E> {
    pub fn new(breaker: CircuitBreaker, key: impl Into<String>) -> Self {
        Self {
            breaker,
            key: key.into(),
            trips: None,
        }
    }

    /// Only errors matching `predicate` count against the circuit.
    ///
    /// Other errors mean the dependency answered, so they are reported as
    /// successes and returned to the caller as-is.
    pub fn tripped_by<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.trips = Some(Arc::new(predicate));
        self
    }

    /// Run `operation` under the circuit.
    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, GuardError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.breaker.permit(&self.key).await;
        match (permit.decision, permit.degraded) {
            (Decision::Reject, Some(reason)) => {
                return Err(GuardError::Unavailable {
                    key: self.key.clone(),
                    reason,
                })
            }
            (Decision::Reject, None) => {
                tracing::debug!(circuit = %self.key, "Call skipped, circuit open");
                return Err(GuardError::Open { key: self.key.clone() });
            }
            (Decision::AllowAsProbe, _) => {
                tracing::info!(circuit = %self.key, "Running probe call");
            }
            (Decision::Allow, _) => {}
        }

        let result = operation().await;

        let report = match &result {
            Ok(_) => self.breaker.record_outcome(&self.key, Outcome::Success).await,
            Err(e) if self.counts_as_failure(e) => {
                self.breaker.record_failure(&self.key, &e.to_string()).await
            }
            Err(_) => self.breaker.record_outcome(&self.key, Outcome::Success).await,
        };
        if let Err(err) = report {
            // The call already happened; losing the state update must not change its result.
            tracing::warn!(circuit = %self.key, error = %err, "Outcome not recorded");
        }

        result.map_err(GuardError::Inner)
    }

    fn counts_as_failure(&self, err: &E) -> bool {
        self.trips.as_ref().map_or(true, |trips| trips(err))
    }
}
