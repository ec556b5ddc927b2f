//! End-to-end circuit lifecycle through the engine.

use chrono::TimeDelta;
use std::sync::Arc;

use stateless_breaker::config::CircuitPolicy;
use stateless_breaker::resilience::{BreakerError, Permit};
use stateless_breaker::store::MemoryStore;
use stateless_breaker::{BreakerConfig, CircuitBreaker, CircuitStatus, Decision, Outcome};

mod common;

#[tokio::test]
async fn test_open_half_open_close_cycle() {
    let h = common::harness(common::policy(3));

    for _ in 0..3 {
        assert_eq!(h.breaker.permit("inventory").await.decision, Decision::Allow);
        h.breaker.record_outcome("inventory", Outcome::Failure).await.unwrap();
    }

    // Fourth call is rejected and the circuit is open.
    assert_eq!(h.breaker.permit("inventory").await, Permit::decided(Decision::Reject));
    let record = h.breaker.status("inventory").await.unwrap().unwrap();
    assert_eq!(record.status, CircuitStatus::Open);

    h.clock.advance(TimeDelta::seconds(30));
    assert_eq!(h.breaker.permit("inventory").await.decision, Decision::AllowAsProbe);
    h.breaker.record_outcome("inventory", Outcome::Success).await.unwrap();

    assert_eq!(h.breaker.permit("inventory").await.decision, Decision::Allow);
    let record = h.breaker.status("inventory").await.unwrap().unwrap();
    assert_eq!(record.status, CircuitStatus::Closed);
    assert_eq!(record.failure_count, 0);
    assert!(!record.probe_in_flight);
}

#[tokio::test]
async fn test_open_rejects_without_writing() {
    let h = common::harness(common::policy(1));
    h.breaker.record_outcome("search", Outcome::Failure).await.unwrap();
    let writes = h.store.writes();

    for seconds in [0, 5, 24] {
        h.clock.advance(TimeDelta::seconds(seconds));
        let permit = h.breaker.permit("search").await;
        assert_eq!(permit.decision, Decision::Reject);
        assert!(permit.degraded.is_none());
    }
    assert_eq!(h.store.writes(), writes);
}

#[tokio::test]
async fn test_failed_probe_reopens() {
    let h = common::harness(common::policy(1));
    h.breaker.record_failure("search", "503 from upstream").await.unwrap();

    h.clock.advance(TimeDelta::seconds(31));
    assert!(h.breaker.permit("search").await.is_probe());
    h.breaker.record_failure("search", "still 503").await.unwrap();

    let record = h.breaker.status("search").await.unwrap().unwrap();
    assert_eq!(record.status, CircuitStatus::Open);
    assert!(!record.probe_in_flight);
    assert_eq!(record.last_failure.as_deref(), Some("still 503"));

    // The open window restarts from the failed probe.
    h.clock.advance(TimeDelta::seconds(29));
    assert_eq!(h.breaker.permit("search").await.decision, Decision::Reject);
    h.clock.advance(TimeDelta::seconds(1));
    assert!(h.breaker.permit("search").await.is_probe());
}

#[tokio::test]
async fn test_success_while_closed_resets_counter() {
    let h = common::harness(common::policy(3));
    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();
    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();
    h.breaker.record_outcome("db", Outcome::Success).await.unwrap();
    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();
    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();

    assert_eq!(h.breaker.permit("db").await.decision, Decision::Allow);
    let record = h.breaker.status("db").await.unwrap().unwrap();
    assert_eq!(record.failure_count, 2);
}

#[tokio::test]
async fn test_unreported_probe_is_replaced_after_probe_timeout() {
    let mut policy = common::policy(1);
    policy.probe_timeout_secs = Some(10);
    let h = common::harness(policy);

    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();
    h.clock.advance(TimeDelta::seconds(30));
    assert!(h.breaker.permit("db").await.is_probe());

    // Probe holder never reports back.
    h.clock.advance(TimeDelta::seconds(9));
    assert_eq!(h.breaker.permit("db").await.decision, Decision::Reject);
    h.clock.advance(TimeDelta::seconds(1));
    assert!(h.breaker.permit("db").await.is_probe());
    assert_eq!(h.breaker.permit("db").await.decision, Decision::Reject);
}

#[tokio::test]
async fn test_expired_record_starts_over_closed() {
    let mut policy = common::policy(1);
    policy.record_ttl_secs = Some(60);
    let h = common::harness(policy);

    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();
    assert_eq!(h.breaker.permit("db").await.decision, Decision::Reject);

    h.clock.advance(TimeDelta::seconds(61));
    assert!(h.breaker.status("db").await.unwrap().is_none());
    assert_eq!(h.breaker.permit("db").await.decision, Decision::Allow);
}

#[tokio::test]
async fn test_ttl_shorter_than_probe_lease_is_refused() {
    let policy = CircuitPolicy {
        probe_timeout_secs: Some(120),
        record_ttl_secs: Some(60),
        ..common::policy(1)
    };
    let config = BreakerConfig {
        circuit: policy.clone(),
        ..BreakerConfig::default()
    };

    let result = CircuitBreaker::new(Arc::new(MemoryStore::new()), &config);
    assert!(matches!(result, Err(BreakerError::InvalidConfiguration(_))));

    let h = common::harness(common::policy(1));
    let result = h.breaker.clone().with_policy("db", policy);
    assert!(matches!(result, Err(BreakerError::InvalidConfiguration(_))));
}

#[tokio::test]
async fn test_outstanding_probe_outlives_record_ttl_window() {
    let mut policy = common::policy(1);
    policy.probe_timeout_secs = Some(120);
    policy.record_ttl_secs = Some(150);
    let h = common::harness(policy);

    h.breaker.record_outcome("db", Outcome::Failure).await.unwrap();
    h.clock.advance(TimeDelta::seconds(30));
    assert!(h.breaker.permit("db").await.is_probe());

    // Past the open window again, still inside the probe lease.
    h.clock.advance(TimeDelta::seconds(61));
    assert_eq!(h.breaker.permit("db").await.decision, Decision::Reject);
    let record = h.breaker.status("db").await.unwrap().unwrap();
    assert_eq!(record.status, CircuitStatus::HalfOpen);
    assert!(record.probe_in_flight);

    h.clock.advance(TimeDelta::seconds(59));
    assert!(h.breaker.permit("db").await.is_probe());
}
