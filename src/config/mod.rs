//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, environment overrides)
//!     → validation.rs (semantic checks)
//!     → BreakerConfig (validated, immutable)
//!     → handed to the engine at construction
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reconfiguration protocol
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BreakerConfig;
pub use schema::CircuitPolicy;
pub use schema::ObservabilityConfig;
pub use schema::StoreConfig;
