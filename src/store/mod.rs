//! State store subsystem.
//!
//! # Data Flow
//! ```text
//! Engine
//!     → read(key)                  strongly consistent, expired = absent
//!     → create_if_absent(record)   atomic, concurrent creators converge
//!     → conditional_write(record)  accepted only if stored version == record.version
//!
//! Backends:
//!     memory.rs  (DashMap, one process; tests and single-instance use)
//!     sqlite.rs  (sqlx, shared file/database; conditional UPDATE on version)
//! ```
//!
//! # Design Decisions
//! - No business logic here; the store only persists and compares versions
//! - Version tokens are assigned by the store, never by callers
//! - Expiry is evaluated against the store's clock on every access

pub mod memory;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::schema::{StoreBackend, StoreConfig};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{CircuitRecord, CircuitStatus, StoreError, StoreResult, Version};

/// Narrow persistence boundary for circuit records.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the current record, or `None` if absent or expired.
    async fn read(&self, key: &str) -> StoreResult<Option<CircuitRecord>>;

    /// Insert `initial` unless a live record already exists for its key.
    ///
    /// Returns whichever record is stored once the call completes, so racing
    /// creators all observe the same record.
    async fn create_if_absent(&self, initial: CircuitRecord) -> StoreResult<CircuitRecord>;

    /// Replace the record if the stored version still equals `record.version`.
    ///
    /// On success the returned record carries the new version.
    async fn conditional_write(&self, record: &CircuitRecord) -> StoreResult<CircuitRecord>;
}

/// Build the store described by `config`.
pub async fn connect(config: &StoreConfig, clock: SharedClock) -> StoreResult<Arc<dyn StateStore>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory circuit store");
            Ok(Arc::new(MemoryStore::with_clock(clock)))
        }
        StoreBackend::Sqlite => {
            let store = SqliteStore::builder()
                .url(&config.url)
                .table(&config.table)
                .namespace(config.namespace.clone())
                .max_connections(config.max_connections)
                .clock(clock)
                .build()
                .await?;
            Ok(Arc::new(store))
        }
    }
}
