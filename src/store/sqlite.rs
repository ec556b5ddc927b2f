//! SQLite-backed circuit store.
//!
//! One row per circuit. Conditional writes are a single
//! `UPDATE ... WHERE version = ?`; zero affected rows means another writer
//! got there first. Timestamps are stored as epoch milliseconds.
//!
//! Several functions can share a table by giving each a namespace; the
//! stored key becomes `<namespace>#<key>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::{SharedClock, SystemClock};
use crate::store::types::{CircuitRecord, CircuitStatus, StoreError, StoreResult, Version};
use crate::store::StateStore;

/// Default table name.
pub const DEFAULT_TABLE: &str = "circuit_breaker";

/// SQLite state store.
pub struct SqliteStore {
    pool: SqlitePool,
    table: String,
    namespace: Option<String>,
    clock: SharedClock,
}

impl SqliteStore {
    pub fn builder() -> SqliteStoreBuilder {
        SqliteStoreBuilder::default()
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::builder().build().await
    }

    async fn initialize_schema(&self) -> StoreResult<()> {
        debug!(table = %self.table, "Initializing circuit table");
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                circuit_key TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                failure_count INTEGER NOT NULL,
                last_transition_at INTEGER NOT NULL,
                probe_in_flight INTEGER NOT NULL,
                last_failure TEXT,
                expires_at INTEGER,
                version INTEGER NOT NULL
            )
            "#,
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn storage_key(&self, key: &str) -> String {
        match &self.namespace {
            Some(ns) => format!("{}#{}", ns, key),
            None => key.to_string(),
        }
    }

    fn decode(key: &str, row: &SqliteRow) -> StoreResult<CircuitRecord> {
        let status: String = row.try_get("status")?;
        let failure_count: i64 = row.try_get("failure_count")?;
        let last_transition_at: i64 = row.try_get("last_transition_at")?;
        let probe_in_flight: bool = row.try_get("probe_in_flight")?;
        let last_failure: Option<String> = row.try_get("last_failure")?;
        let expires_at: Option<i64> = row.try_get("expires_at")?;
        let version: i64 = row.try_get("version")?;

        Ok(CircuitRecord {
            key: key.to_string(),
            status: CircuitStatus::from_str(&status)?,
            failure_count: u32::try_from(failure_count)
                .map_err(|_| StoreError::Corrupt(format!("failure_count {} out of range", failure_count)))?,
            last_transition_at: from_millis(last_transition_at)?,
            probe_in_flight,
            last_failure,
            expires_at: expires_at.map(from_millis).transpose()?,
            version: Version(
                u64::try_from(version)
                    .map_err(|_| StoreError::Corrupt(format!("version {} out of range", version)))?,
            ),
        })
    }

    async fn fetch(&self, key: &str, live_only: bool) -> StoreResult<Option<CircuitRecord>> {
        let now = self.clock.now().timestamp_millis();
        let sql = if live_only {
            format!(
                "SELECT * FROM {} WHERE circuit_key = ? AND (expires_at IS NULL OR expires_at > ?)",
                self.table
            )
        } else {
            format!("SELECT * FROM {} WHERE circuit_key = ?", self.table)
        };

        let mut query = sqlx::query(&sql).bind(self.storage_key(key));
        if live_only {
            query = query.bind(now);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => Ok(Some(Self::decode(key, &row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn read(&self, key: &str) -> StoreResult<Option<CircuitRecord>> {
        self.fetch(key, true).await
    }

    async fn create_if_absent(&self, initial: CircuitRecord) -> StoreResult<CircuitRecord> {
        let now = self.clock.now().timestamp_millis();
        // An expired row is overwritten in place and keeps counting versions.
        let sql = format!(
            r#"
            INSERT INTO {table} (circuit_key, status, failure_count, last_transition_at,
                                 probe_in_flight, last_failure, expires_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(circuit_key) DO UPDATE SET
                status = excluded.status,
                failure_count = excluded.failure_count,
                last_transition_at = excluded.last_transition_at,
                probe_in_flight = excluded.probe_in_flight,
                last_failure = excluded.last_failure,
                expires_at = excluded.expires_at,
                version = {table}.version + 1
            WHERE {table}.expires_at IS NOT NULL AND {table}.expires_at <= ?
            "#,
            table = self.table
        );

        sqlx::query(&sql)
            .bind(self.storage_key(&initial.key))
            .bind(initial.status.as_str())
            .bind(i64::from(initial.failure_count))
            .bind(initial.last_transition_at.timestamp_millis())
            .bind(initial.probe_in_flight)
            .bind(initial.last_failure.as_deref())
            .bind(initial.expires_at.map(|at| at.timestamp_millis()))
            .bind(to_i64(initial.version)?)
            .bind(now)
            .execute(&self.pool)
            .await?;

        self.fetch(&initial.key, false).await?.ok_or_else(|| {
            StoreError::Unavailable(format!("record '{}' missing after create", initial.key))
        })
    }

    async fn conditional_write(&self, record: &CircuitRecord) -> StoreResult<CircuitRecord> {
        let now = self.clock.now().timestamp_millis();
        let next = record.version.next();
        let sql = format!(
            r#"
            UPDATE {table} SET
                status = ?,
                failure_count = ?,
                last_transition_at = ?,
                probe_in_flight = ?,
                last_failure = ?,
                expires_at = ?,
                version = ?
            WHERE circuit_key = ? AND version = ? AND (expires_at IS NULL OR expires_at > ?)
            "#,
            table = self.table
        );

        let result = sqlx::query(&sql)
            .bind(record.status.as_str())
            .bind(i64::from(record.failure_count))
            .bind(record.last_transition_at.timestamp_millis())
            .bind(record.probe_in_flight)
            .bind(record.last_failure.as_deref())
            .bind(record.expires_at.map(|at| at.timestamp_millis()))
            .bind(to_i64(next)?)
            .bind(self.storage_key(&record.key))
            .bind(to_i64(record.version)?)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(circuit = %record.key, expected = %record.version, "Conditional write rejected");
            return Err(StoreError::VersionConflict {
                key: record.key.clone(),
                expected: record.version,
            });
        }

        let mut written = record.clone();
        written.version = next;
        Ok(written)
    }
}

/// Builder for [`SqliteStore`].
pub struct SqliteStoreBuilder {
    url: String,
    table: String,
    namespace: Option<String>,
    max_connections: u32,
    clock: Option<SharedClock>,
}

impl Default for SqliteStoreBuilder {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            table: DEFAULT_TABLE.to_string(),
            namespace: None,
            max_connections: 5,
            clock: None,
        }
    }
}

impl SqliteStoreBuilder {
    /// Database URL, e.g. `sqlite:///var/lib/breaker.db` or `sqlite::memory:`.
    pub fn url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Prefix for every stored key.
    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub async fn build(self) -> StoreResult<SqliteStore> {
        if !is_identifier(&self.table) {
            return Err(StoreError::Configuration(format!(
                "table name '{}' is not a valid identifier",
                self.table
            )));
        }

        info!(url = %self.url, table = %self.table, "Connecting SQLite circuit store");

        let options = SqliteConnectOptions::from_str(&self.url)?.create_if_missing(true);

        // Every connection to `:memory:` is its own database, so pin to one.
        let in_memory = self.url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(self.max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;

        let store = SqliteStore {
            pool,
            table: self.table,
            namespace: self.namespace,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };
        store.initialize_schema().await?;
        Ok(store)
    }
}

/// True if `name` is safe to splice into SQL as a table name.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {} out of range", ms)))
}

fn to_i64(version: Version) -> StoreResult<i64> {
    i64::try_from(version.0).map_err(|_| StoreError::Corrupt(format!("version {} out of range", version)))
}
