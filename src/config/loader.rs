//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{Environment, GovernorConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {reason}")]
    Env { var: &'static str, reason: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load the effective configuration: optional file, then environment overrides,
/// then validation.
pub fn load(path: Option<&Path>) -> Result<GovernorConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml::from_str(&fs::read_to_string(path)?)?,
        None => GovernorConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply environment overrides using `lookup` to resolve variables.
///
/// Empty values are treated as unset.
pub fn apply_env_overrides<F>(config: &mut GovernorConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(raw) = get("APP_ENV") {
        config.environment = raw
            .parse::<Environment>()
            .map_err(|reason| ConfigError::Env { var: "APP_ENV", reason })?;
    }
    if let Some(addr) = get("GOVERNOR_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }
    if let Some(level) = get("GOVERNOR_LOG_LEVEL") {
        config.observability.log_level = level;
    }
    if let Some(addr) = get("CACHE_ADDRESS") {
        config.health.cache_address = Some(addr);
    }
    if let Some(url) = get("OBJECT_STORAGE_URL") {
        config.health.object_storage_url = Some(url);
    }
    if let Some(dir) = get("DATA_DIR") {
        config.health.data_dir = PathBuf::from(dir);
    }
    if config.health.credential.value.is_none() {
        config.health.credential.value = get(&config.health.credential.env_var);
    }

    Ok(())
}
