//! Circuit state machine.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a single probe call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: at permit time, once open_timeout has elapsed (grants the probe)
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Pure functions: record in, record out; the engine owns all I/O
//! - Time is evaluated lazily; nothing here runs on a timer
//! - Every returned record keeps the version it was derived from, so the
//!   engine can write it conditionally
//! - A probe that never reports is presumed lost after probe_timeout

use chrono::{DateTime, TimeDelta, Utc};

use crate::config::schema::CircuitPolicy;
use crate::resilience::types::{Decision, Outcome};
use crate::store::{CircuitRecord, CircuitStatus};

/// Timing and threshold parameters of one circuit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateParams {
    pub failure_threshold: u32,
    pub open_timeout: TimeDelta,
    pub probe_timeout: TimeDelta,
    pub record_ttl: Option<TimeDelta>,
}

impl StateParams {
    pub fn from_policy(policy: &CircuitPolicy) -> Self {
        Self {
            failure_threshold: policy.failure_threshold,
            open_timeout: to_delta(policy.open_timeout()),
            probe_timeout: to_delta(policy.probe_timeout()),
            record_ttl: policy.record_ttl().map(to_delta),
        }
    }
}

fn to_delta(d: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// What `decide` concluded, and the record to write if state must change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub next: Option<CircuitRecord>,
}

impl Verdict {
    fn read_only(decision: Decision) -> Self {
        Self { decision, next: None }
    }
}

/// Decide whether a call may proceed, applying the permit-time transitions.
pub fn decide(record: &CircuitRecord, params: &StateParams, now: DateTime<Utc>) -> Verdict {
    let elapsed = now - record.last_transition_at;

    match record.status {
        CircuitStatus::Closed => Verdict::read_only(Decision::Allow),
        CircuitStatus::Open if elapsed >= params.open_timeout => {
            let mut next = record.clone();
            next.status = CircuitStatus::HalfOpen;
            next.failure_count = 0;
            next.probe_in_flight = true;
            next.last_transition_at = now;
            Verdict {
                decision: Decision::AllowAsProbe,
                next: Some(stamp(next, params, now)),
            }
        }
        CircuitStatus::Open => Verdict::read_only(Decision::Reject),
        CircuitStatus::HalfOpen if !record.probe_in_flight || elapsed >= params.probe_timeout => {
            // No probe outstanding, or the previous holder never reported back.
            let mut next = record.clone();
            next.probe_in_flight = true;
            next.last_transition_at = now;
            Verdict {
                decision: Decision::AllowAsProbe,
                next: Some(stamp(next, params, now)),
            }
        }
        CircuitStatus::HalfOpen => Verdict::read_only(Decision::Reject),
    }
}

/// Apply a reported outcome. `None` means the record stays as it is.
pub fn apply_outcome(
    record: &CircuitRecord,
    outcome: Outcome,
    cause: Option<&str>,
    params: &StateParams,
    now: DateTime<Utc>,
) -> Option<CircuitRecord> {
    let mut next = record.clone();

    match (record.status, outcome) {
        (CircuitStatus::Closed, Outcome::Success) => {
            if record.failure_count == 0 {
                return None;
            }
            next.failure_count = 0;
        }
        (CircuitStatus::Closed, Outcome::Failure) => {
            let failures = record.failure_count.saturating_add(1);
            next.last_failure = cause.map(str::to_string);
            if failures >= params.failure_threshold {
                next.status = CircuitStatus::Open;
                next.failure_count = 0;
                next.last_transition_at = now;
            } else {
                next.failure_count = failures;
            }
        }
        // Stragglers from calls admitted before the circuit opened.
        // A late failure must not extend the open window.
        (CircuitStatus::Open, _) => return None,
        (CircuitStatus::HalfOpen, Outcome::Success) => {
            next.status = CircuitStatus::Closed;
            next.failure_count = 0;
            next.probe_in_flight = false;
            next.last_failure = None;
            next.last_transition_at = now;
        }
        (CircuitStatus::HalfOpen, Outcome::Failure) => {
            next.status = CircuitStatus::Open;
            next.failure_count = 0;
            next.probe_in_flight = false;
            next.last_failure = cause.map(str::to_string);
            next.last_transition_at = now;
        }
    }

    Some(stamp(next, params, now))
}

/// The record created lazily on first access to a key.
pub fn initial_record(key: &str, params: &StateParams, now: DateTime<Utc>) -> CircuitRecord {
    stamp(CircuitRecord::closed(key, now), params, now)
}

fn stamp(mut record: CircuitRecord, params: &StateParams, now: DateTime<Utc>) -> CircuitRecord {
    if let Some(ttl) = params.record_ttl {
        record.expires_at = now.checked_add_signed(ttl);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Version;

    fn params(threshold: u32) -> StateParams {
        StateParams::from_policy(&CircuitPolicy {
            failure_threshold: threshold,
            open_timeout_secs: 30,
            ..CircuitPolicy::default()
        })
    }

    fn record_in(status: CircuitStatus, at: DateTime<Utc>) -> CircuitRecord {
        let mut record = CircuitRecord::closed("db", at);
        record.status = status;
        record.probe_in_flight = status == CircuitStatus::HalfOpen;
        record.version = Version(4);
        record
    }

    #[test]
    fn test_closed_allows_without_write() {
        let now = Utc::now();
        let verdict = decide(&record_in(CircuitStatus::Closed, now), &params(3), now);
        assert_eq!(verdict, Verdict::read_only(Decision::Allow));
    }

    #[test]
    fn test_failures_open_at_threshold() {
        let p = params(3);
        let now = Utc::now();
        let mut record = record_in(CircuitStatus::Closed, now);

        for expected in 1..3 {
            record = apply_outcome(&record, Outcome::Failure, Some("boom"), &p, now).unwrap();
            assert_eq!(record.status, CircuitStatus::Closed);
            assert_eq!(record.failure_count, expected);
        }

        let later = now + TimeDelta::seconds(5);
        record = apply_outcome(&record, Outcome::Failure, Some("boom"), &p, later).unwrap();
        assert_eq!(record.status, CircuitStatus::Open);
        assert_eq!(record.failure_count, 0);
        assert_eq!(record.last_transition_at, later);
        assert_eq!(record.last_failure.as_deref(), Some("boom"));
        // Version is carried for the conditional write.
        assert_eq!(record.version, Version(4));
    }

    #[test]
    fn test_success_resets_count_and_skips_noop_write() {
        let p = params(3);
        let now = Utc::now();
        let mut record = record_in(CircuitStatus::Closed, now);
        assert!(apply_outcome(&record, Outcome::Success, None, &p, now).is_none());

        record.failure_count = 2;
        let next = apply_outcome(&record, Outcome::Success, None, &p, now).unwrap();
        assert_eq!(next.failure_count, 0);
        assert_eq!(next.status, CircuitStatus::Closed);
    }

    #[test]
    fn test_open_rejects_until_timeout() {
        let p = params(3);
        let opened = Utc::now();
        let record = record_in(CircuitStatus::Open, opened);

        let verdict = decide(&record, &p, opened + TimeDelta::seconds(29));
        assert_eq!(verdict, Verdict::read_only(Decision::Reject));

        let at = opened + TimeDelta::seconds(30);
        let verdict = decide(&record, &p, at);
        assert_eq!(verdict.decision, Decision::AllowAsProbe);
        let next = verdict.next.unwrap();
        assert_eq!(next.status, CircuitStatus::HalfOpen);
        assert!(next.probe_in_flight);
        assert_eq!(next.last_transition_at, at);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let p = params(3);
        let at = Utc::now();
        let record = record_in(CircuitStatus::HalfOpen, at);
        assert_eq!(
            decide(&record, &p, at + TimeDelta::seconds(1)),
            Verdict::read_only(Decision::Reject)
        );
    }

    #[test]
    fn test_lost_probe_is_replaced_after_probe_timeout() {
        let p = params(3);
        let at = Utc::now();
        let record = record_in(CircuitStatus::HalfOpen, at);
        let verdict = decide(&record, &p, at + TimeDelta::seconds(30));
        assert_eq!(verdict.decision, Decision::AllowAsProbe);
        assert!(verdict.next.unwrap().probe_in_flight);
    }

    #[test]
    fn test_half_open_without_probe_grants_one() {
        let p = params(3);
        let at = Utc::now();
        let mut record = record_in(CircuitStatus::HalfOpen, at);
        record.probe_in_flight = false;
        assert_eq!(decide(&record, &p, at).decision, Decision::AllowAsProbe);
    }

    #[test]
    fn test_probe_outcomes() {
        let p = params(3);
        let at = Utc::now();
        let mut probing = record_in(CircuitStatus::HalfOpen, at);
        probing.last_failure = Some("old".into());
        let later = at + TimeDelta::seconds(2);

        let closed = apply_outcome(&probing, Outcome::Success, None, &p, later).unwrap();
        assert_eq!(closed.status, CircuitStatus::Closed);
        assert_eq!(closed.failure_count, 0);
        assert!(!closed.probe_in_flight);
        assert!(closed.last_failure.is_none());

        let reopened = apply_outcome(&probing, Outcome::Failure, Some("still down"), &p, later).unwrap();
        assert_eq!(reopened.status, CircuitStatus::Open);
        assert!(!reopened.probe_in_flight);
        assert_eq!(reopened.last_transition_at, later);
    }

    #[test]
    fn test_outcomes_while_open_do_not_extend_window() {
        let p = params(3);
        let at = Utc::now();
        let record = record_in(CircuitStatus::Open, at);
        assert!(apply_outcome(&record, Outcome::Failure, None, &p, at + TimeDelta::seconds(10)).is_none());
        assert!(apply_outcome(&record, Outcome::Success, None, &p, at).is_none());
    }

    #[test]
    fn test_ttl_stamped_on_writes() {
        let p = StateParams::from_policy(&CircuitPolicy {
            failure_threshold: 1,
            record_ttl_secs: Some(600),
            ..CircuitPolicy::default()
        });
        let now = Utc::now();
        let next = apply_outcome(&record_in(CircuitStatus::Closed, now), Outcome::Failure, None, &p, now).unwrap();
        assert_eq!(next.expires_at, Some(now + TimeDelta::seconds(600)));
    }
}
