//! Bounded retry of read-decide-write cycles.
//!
//! # Responsibilities
//! - Count attempts of one permit/outcome cycle against the retry budget
//! - Pause (optionally) between attempts after a version conflict
//!
//! # Design Decisions
//! - Only version conflicts are retried; store outages surface at once
//! - The losing writer re-reads and recomputes; it never waits on the winner
//! - Budget exhaustion is reported, the caller chooses the conservative answer

use std::time::Duration;

use crate::config::schema::CircuitPolicy;
use crate::resilience::backoff::calculate_backoff;

/// Attempt counter for one read-decide-write cycle.
#[derive(Debug, Clone)]
pub struct ConflictRetry {
    max_attempts: u32,
    attempt: u32,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
}

impl ConflictRetry {
    pub fn new(retry_budget: u32, backoff_base_ms: u64, backoff_max_ms: u64) -> Self {
        Self {
            max_attempts: retry_budget.saturating_add(1),
            attempt: 0,
            backoff_base_ms,
            backoff_max_ms,
        }
    }

    pub fn from_policy(policy: &CircuitPolicy) -> Self {
        Self::new(
            policy.retry_budget,
            policy.retry_backoff_base_ms,
            policy.retry_backoff_max_ms,
        )
    }

    /// Start the next attempt. Returns false once the budget is spent.
    pub fn begin(&mut self) -> bool {
        if self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        true
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Pause before the next attempt, if backoff is configured.
    pub async fn pause(&self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn next_delay(&self) -> Duration {
        calculate_backoff(self.attempt, self.backoff_base_ms, self.backoff_max_ms)
    }
}
