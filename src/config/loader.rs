//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::BreakerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Set to anything but `false` to turn the breaker off.
pub const CIRCUIT_BREAKER_DISABLED_ENV: &str = "CIRCUIT_BREAKER_DISABLED";

/// Name of the running function; used as the default store namespace.
pub const FUNCTION_NAME_ENV: &str = "AWS_LAMBDA_FUNCTION_NAME";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<BreakerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_config_str(&content)
}

/// Same as [`load_config`] for an in-memory document.
pub fn load_config_str(content: &str) -> Result<BreakerConfig, ConfigError> {
    let mut config: BreakerConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment-driven settings using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut BreakerConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(CIRCUIT_BREAKER_DISABLED_ENV) {
        if !value.trim().eq_ignore_ascii_case("false") {
            tracing::info!("Circuit breaker disabled via {}", CIRCUIT_BREAKER_DISABLED_ENV);
            config.enabled = false;
        }
    }

    if config.store.namespace.is_none() {
        if let Some(function) = lookup(FUNCTION_NAME_ENV).filter(|f| !f.is_empty()) {
            config.store.namespace = Some(format!("circuitBreaker#{}", function));
        }
    }
}
