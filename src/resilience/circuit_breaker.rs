//! Store-backed circuit breaker engine.
//!
//! # Data Flow
//! ```text
//! permit(key):
//!     read(key) ── absent ──→ create_if_absent(CLOSED)
//!     → state::decide()
//!     → conditional_write() if the decision changes state (OPEN → HALF_OPEN)
//!     → on VersionConflict: re-read and decide again, within the retry budget
//!
//! record_outcome(key, outcome):
//!     read(key) ── absent ──→ create_if_absent(CLOSED)
//!     → state::apply_outcome()
//!     → conditional_write() unless nothing changed
//! ```
//!
//! # Design Decisions
//! - No circuit state is kept in process; every call reads the store
//! - Contention exhaustion rejects (prevents duplicate probes)
//! - Store outages follow the per-circuit fail-open/fail-closed policy
//! - Outcome write failures are returned, never turned into call failures

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{SharedClock, SystemClock};
use crate::config::schema::{BreakerConfig, CircuitPolicy};
use crate::config::validation::{validate_config, validate_policy};
use crate::observability::metrics;
use crate::resilience::retries::ConflictRetry;
use crate::resilience::state::{self, StateParams};
use crate::resilience::timeouts::with_deadline;
use crate::resilience::types::{BreakerError, BreakerResult, Decision, Degradation, Outcome, Permit};
use crate::store::{CircuitRecord, CircuitStatus, StateStore, StoreError, StoreResult};

/// Coordinates circuit state for many stateless invocations through a shared store.
///
/// Cheap to clone; clones share the store handle.
#[derive(Clone)]
pub struct CircuitBreaker {
    store: Arc<dyn StateStore>,
    clock: SharedClock,
    enabled: bool,
    default_policy: CircuitPolicy,
    overrides: HashMap<String, CircuitPolicy>,
}

impl CircuitBreaker {
    /// Create an engine over `store` with validated configuration.
    pub fn new(store: Arc<dyn StateStore>, config: &BreakerConfig) -> BreakerResult<Self> {
        validate_config(config).map_err(BreakerError::InvalidConfiguration)?;

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            enabled: config.enabled,
            default_policy: config.circuit.clone(),
            overrides: config.circuits.clone(),
        })
    }

    /// Replace the time source (simulated time in tests and demos).
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Register or replace the policy of one circuit.
    pub fn with_policy(
        mut self,
        key: impl Into<String>,
        policy: CircuitPolicy,
    ) -> BreakerResult<Self> {
        validate_policy(&policy).map_err(BreakerError::InvalidConfiguration)?;
        self.overrides.insert(key.into(), policy);
        Ok(self)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Policy in force for `key`.
    pub fn policy(&self, key: &str) -> &CircuitPolicy {
        self.overrides.get(key).unwrap_or(&self.default_policy)
    }

    /// Decide whether a call to the dependency named `key` may proceed.
    ///
    /// Never fails: store trouble is folded into the decision per policy and
    /// reported through [`Permit::degraded`].
    pub async fn permit(&self, key: &str) -> Permit {
        if !self.enabled {
            return Permit::decided(Decision::Allow);
        }

        let policy = self.policy(key);
        let params = StateParams::from_policy(policy);
        let mut retry = ConflictRetry::from_policy(policy);

        let permit = loop {
            if !retry.begin() {
                warn!(
                    circuit = key,
                    attempts = retry.attempts(),
                    "Permit lost every version race, rejecting"
                );
                break Permit::degraded(
                    Decision::Reject,
                    Degradation::ContentionExhausted {
                        attempts: retry.attempts(),
                    },
                );
            }

            match self.try_permit(key, policy, &params).await {
                Ok(decision) => break Permit::decided(decision),
                Err(StoreError::VersionConflict { expected, .. }) => {
                    debug!(
                        circuit = key,
                        attempt = retry.attempts(),
                        version = %expected,
                        "Permit write conflicted, retrying"
                    );
                    metrics::record_version_conflict(key);
                    retry.pause().await;
                }
                Err(err) => break self.store_unavailable_permit(key, policy, err),
            }
        };

        metrics::record_decision(key, permit.decision);
        permit
    }

    /// Report the result of a call admitted by [`permit`](Self::permit).
    ///
    /// Must be called exactly once per admitted call; reports are not idempotent.
    pub async fn record_outcome(&self, key: &str, outcome: Outcome) -> BreakerResult<()> {
        self.report(key, outcome, None).await
    }

    /// Report a failure together with a description of what went wrong.
    pub async fn record_failure(&self, key: &str, cause: &str) -> BreakerResult<()> {
        self.report(key, Outcome::Failure, Some(cause)).await
    }

    /// Current record for `key` without creating or changing it.
    pub async fn status(&self, key: &str) -> BreakerResult<Option<CircuitRecord>> {
        let policy = self.policy(key);
        with_deadline(policy.store_timeout(), self.store.read(key))
            .await
            .map_err(|source| BreakerError::StoreUnavailable {
                key: key.to_string(),
                source,
            })
    }

    async fn report(&self, key: &str, outcome: Outcome, cause: Option<&str>) -> BreakerResult<()> {
        if !self.enabled {
            return Ok(());
        }
        metrics::record_outcome(key, outcome);

        let policy = self.policy(key);
        let params = StateParams::from_policy(policy);
        let mut retry = ConflictRetry::from_policy(policy);

        loop {
            if !retry.begin() {
                warn!(
                    circuit = key,
                    outcome = %outcome,
                    attempts = retry.attempts(),
                    "Outcome lost every version race"
                );
                return Err(BreakerError::ContentionExhausted {
                    key: key.to_string(),
                    attempts: retry.attempts(),
                });
            }

            match self.try_report(key, outcome, cause, policy, &params).await {
                Ok(()) => return Ok(()),
                Err(StoreError::VersionConflict { expected, .. }) => {
                    debug!(
                        circuit = key,
                        attempt = retry.attempts(),
                        version = %expected,
                        "Outcome write conflicted, retrying"
                    );
                    metrics::record_version_conflict(key);
                    retry.pause().await;
                }
                Err(source) => {
                    metrics::record_store_error("record_outcome");
                    warn!(
                        circuit = key,
                        outcome = %outcome,
                        error = %source,
                        "Failed to record outcome"
                    );
                    return Err(BreakerError::StoreUnavailable {
                        key: key.to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn try_permit(
        &self,
        key: &str,
        policy: &CircuitPolicy,
        params: &StateParams,
    ) -> StoreResult<Decision> {
        let now = self.clock.now();
        let record = self.load(key, policy, params, now).await?;
        let verdict = state::decide(&record, params, now);

        if let Some(next) = verdict.next {
            let written =
                with_deadline(policy.store_timeout(), self.store.conditional_write(&next)).await?;
            log_transition(&record, &written);
        }
        Ok(verdict.decision)
    }

    async fn try_report(
        &self,
        key: &str,
        outcome: Outcome,
        cause: Option<&str>,
        policy: &CircuitPolicy,
        params: &StateParams,
    ) -> StoreResult<()> {
        let now = self.clock.now();
        let record = self.load(key, policy, params, now).await?;

        if let Some(next) = state::apply_outcome(&record, outcome, cause, params, now) {
            let written =
                with_deadline(policy.store_timeout(), self.store.conditional_write(&next)).await?;
            log_transition(&record, &written);
        }
        Ok(())
    }

    /// Read the record, creating a closed one if the key has none.
    async fn load(
        &self,
        key: &str,
        policy: &CircuitPolicy,
        params: &StateParams,
        now: DateTime<Utc>,
    ) -> StoreResult<CircuitRecord> {
        let deadline = policy.store_timeout();
        if let Some(record) = with_deadline(deadline, self.store.read(key)).await? {
            return Ok(record);
        }

        debug!(circuit = key, "No circuit record, creating closed record");
        let initial = state::initial_record(key, params, now);
        with_deadline(deadline, self.store.create_if_absent(initial)).await
    }

    fn store_unavailable_permit(
        &self,
        key: &str,
        policy: &CircuitPolicy,
        err: StoreError,
    ) -> Permit {
        metrics::record_store_error("permit");
        let decision = if policy.fail_closed_on_store_unavailable {
            Decision::Reject
        } else {
            Decision::Allow
        };
        warn!(
            circuit = key,
            error = %err,
            decision = %decision,
            "Circuit store unavailable, applying fallback policy"
        );
        Permit::degraded(decision, Degradation::StoreUnavailable(err.to_string()))
    }
}

fn log_transition(before: &CircuitRecord, after: &CircuitRecord) {
    if before.status == after.status {
        if after.status == CircuitStatus::HalfOpen && after.probe_in_flight {
            info!(circuit = %after.key, version = %after.version, "Replacing unreported probe");
        }
        return;
    }

    metrics::record_transition(&after.key, before.status, after.status);
    match after.status {
        CircuitStatus::Open => warn!(
            circuit = %after.key,
            from = %before.status,
            version = %after.version,
            cause = after.last_failure.as_deref().unwrap_or("unknown"),
            "Circuit opened"
        ),
        CircuitStatus::HalfOpen => info!(
            circuit = %after.key,
            version = %after.version,
            "Circuit half-open, probe granted"
        ),
        CircuitStatus::Closed => info!(
            circuit = %after.key,
            from = %before.status,
            version = %after.version,
            "Circuit closed, normal operation resumed"
        ),
    }
}
