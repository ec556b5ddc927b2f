//! Shared fixtures for integration tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stateless_breaker::clock::ManualClock;
use stateless_breaker::config::{BreakerConfig, CircuitPolicy};
use stateless_breaker::store::{CircuitRecord, MemoryStore, StateStore, StoreError, StoreResult};
use stateless_breaker::CircuitBreaker;

/// Store wrapper that can be told to fail, stall, or lose write races.
#[derive(Clone)]
pub struct FaultyStore {
    inner: Arc<dyn StateStore>,
    unavailable: Arc<AtomicBool>,
    writes_unavailable: Arc<AtomicBool>,
    stall_ms: Arc<AtomicU64>,
    forced_conflicts: Arc<AtomicU32>,
    writes: Arc<AtomicU32>,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            unavailable: Arc::new(AtomicBool::new(false)),
            writes_unavailable: Arc::new(AtomicBool::new(false)),
            stall_ms: Arc::new(AtomicU64::new(0)),
            forced_conflicts: Arc::new(AtomicU32::new(0)),
            writes: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Every operation fails as if the network were down.
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Reads work, conditional writes fail as unavailable.
    pub fn set_writes_unavailable(&self, down: bool) {
        self.writes_unavailable.store(down, Ordering::SeqCst);
    }

    /// Every operation sleeps this long before running.
    pub fn stall(&self, by: Duration) {
        self.stall_ms.store(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// The next `n` conditional writes report a version conflict.
    pub fn force_conflicts(&self, n: u32) {
        self.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Conditional writes that reached the inner store.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> StoreResult<()> {
        let stall = self.stall_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FaultyStore {
    async fn read(&self, key: &str) -> StoreResult<Option<CircuitRecord>> {
        self.gate().await?;
        self.inner.read(key).await
    }

    async fn create_if_absent(&self, initial: CircuitRecord) -> StoreResult<CircuitRecord> {
        self.gate().await?;
        self.inner.create_if_absent(initial).await
    }

    async fn conditional_write(&self, record: &CircuitRecord) -> StoreResult<CircuitRecord> {
        self.gate().await?;
        if self.writes_unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write throttled".into()));
        }
        let forced = self
            .forced_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if forced.is_ok() {
            return Err(StoreError::VersionConflict {
                key: record.key.clone(),
                expected: record.version,
            });
        }
        let written = self.inner.conditional_write(record).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }
}

/// Breaker + fault-injecting memory store + manual clock.
#[allow(dead_code)]
pub struct Harness {
    pub breaker: CircuitBreaker,
    pub store: FaultyStore,
    pub memory: MemoryStore,
    pub clock: ManualClock,
}

#[allow(dead_code)]
pub fn harness(policy: CircuitPolicy) -> Harness {
    let clock = ManualClock::default();
    let memory = MemoryStore::with_clock(Arc::new(clock.clone()));
    let store = FaultyStore::new(Arc::new(memory.clone()));

    let config = BreakerConfig {
        circuit: policy,
        ..BreakerConfig::default()
    };
    let breaker = CircuitBreaker::new(Arc::new(store.clone()), &config)
        .expect("valid test configuration")
        .with_clock(Arc::new(clock.clone()));

    Harness {
        breaker,
        store,
        memory,
        clock,
    }
}

/// Policy with a low threshold and a 30s open window.
#[allow(dead_code)]
pub fn policy(failure_threshold: u32) -> CircuitPolicy {
    CircuitPolicy {
        failure_threshold,
        open_timeout_secs: 30,
        store_timeout_ms: 200,
        ..CircuitPolicy::default()
    }
}
