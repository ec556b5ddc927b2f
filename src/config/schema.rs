//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the breaker.
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Master switch. A disabled breaker allows every call and never touches the store.
    pub enabled: bool,

    /// Policy applied to every circuit without an override.
    pub circuit: CircuitPolicy,

    /// Per-circuit overrides, keyed by circuit key.
    pub circuits: HashMap<String, CircuitPolicy>,

    /// State store settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            circuit: CircuitPolicy::default(),
            circuits: HashMap::new(),
            store: StoreConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Tuning for a single circuit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitPolicy {
    /// Consecutive failures while closed before the circuit opens.
    pub failure_threshold: u32,

    /// Time an open circuit rejects calls before allowing a probe.
    pub open_timeout_secs: u64,

    /// Time after which an unreported probe is presumed lost.
    /// Defaults to `open_timeout_secs`.
    pub probe_timeout_secs: Option<u64>,

    /// Extra read-decide-write attempts after a version conflict.
    pub retry_budget: u32,

    /// Reject (true) or allow (false) calls when the store cannot be reached.
    pub fail_closed_on_store_unavailable: bool,

    /// Deadline for each individual store operation, in milliseconds.
    pub store_timeout_ms: u64,

    /// Base pause between conflict retries in milliseconds (0 = retry at once).
    pub retry_backoff_base_ms: u64,

    /// Cap for the pause between conflict retries in milliseconds.
    pub retry_backoff_max_ms: u64,

    /// Retention applied to every write; unset keeps records forever.
    pub record_ttl_secs: Option<u64>,
}

impl Default for CircuitPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_timeout_secs: 30,
            probe_timeout_secs: None,
            retry_budget: 3,
            fail_closed_on_store_unavailable: true,
            store_timeout_ms: 2000,
            retry_backoff_base_ms: 0,
            retry_backoff_max_ms: 50,
            record_ttl_secs: None,
        }
    }
}

impl CircuitPolicy {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_secs(self.open_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.unwrap_or(self.open_timeout_secs))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn record_ttl(&self) -> Option<Duration> {
        self.record_ttl_secs.map(Duration::from_secs)
    }
}

/// Which store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

/// State store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,

    /// Database URL for SQL backends.
    pub url: String,

    /// Table holding one row per circuit.
    pub table: String,

    /// Key prefix shared by all circuits of one deployment.
    pub namespace: Option<String>,

    /// Connection pool size.
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            url: "sqlite::memory:".to_string(),
            table: "circuit_breaker".to_string(),
            namespace: None,
            max_connections: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// JSON for log shippers, pretty for terminals.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
