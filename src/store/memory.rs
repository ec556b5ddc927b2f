//! In-process circuit store.
//!
//! Backed by a `DashMap`; each operation holds the shard lock for its key,
//! which makes version comparison and replacement a single atomic step.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::clock::{SharedClock, SystemClock};
use crate::store::types::{CircuitRecord, StoreError, StoreResult};
use crate::store::StateStore;

/// Thread-safe in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, CircuitRecord>>,
    clock: SharedClock,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Store a record verbatim, bypassing version checks.
    ///
    /// Intended for seeding fixtures and simulating out-of-band edits.
    pub fn put_raw(&self, record: CircuitRecord) {
        self.inner.insert(record.key.clone(), record);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn read(&self, key: &str) -> StoreResult<Option<CircuitRecord>> {
        let now = self.clock.now();
        Ok(self
            .inner
            .get(key)
            .map(|r| r.value().clone())
            .filter(|record| !record.is_expired(now)))
    }

    async fn create_if_absent(&self, initial: CircuitRecord) -> StoreResult<CircuitRecord> {
        let now = self.clock.now();
        match self.inner.entry(initial.key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    let mut replacement = initial;
                    replacement.version = entry.get().version.next();
                    entry.insert(replacement.clone());
                    tracing::debug!(circuit = %replacement.key, "Replaced expired circuit record");
                    Ok(replacement)
                } else {
                    Ok(entry.get().clone())
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(initial.clone());
                Ok(initial)
            }
        }
    }

    async fn conditional_write(&self, record: &CircuitRecord) -> StoreResult<CircuitRecord> {
        let now = self.clock.now();
        let conflict = || StoreError::VersionConflict {
            key: record.key.clone(),
            expected: record.version,
        };

        let mut stored = self.inner.get_mut(&record.key).ok_or_else(conflict)?;
        if stored.version != record.version || stored.is_expired(now) {
            return Err(conflict());
        }

        let mut written = record.clone();
        written.version = record.version.next();
        *stored = written.clone();
        Ok(written)
    }
}
