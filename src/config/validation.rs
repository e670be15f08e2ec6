//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, attempts >= 1)
//! - Validate addresses and URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GovernorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GovernorConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("observability.metrics_address '{0}' is not a valid socket address")]
    InvalidMetricsAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("health.object_storage_url '{url}' is invalid: {reason}")]
    InvalidStorageUrl { url: String, reason: String },

    #[error("storage_init.base_delay_ms ({base}) exceeds storage_init.max_delay_ms ({max})")]
    BackoffRange { base: u64, max: u64 },
}

/// Validate a loaded configuration.
pub fn validate_config(config: &GovernorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let positive = [
        ("listener.request_timeout_secs", config.listener.request_timeout_secs),
        ("rate_limit.period_ms", config.rate_limit.period_ms),
        ("shutdown.drain_timeout_secs", config.shutdown.drain_timeout_secs),
        ("health.probe_timeout_ms", config.health.probe_timeout_ms),
        ("storage_init.max_attempts", u64::from(config.storage_init.max_attempts)),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::ZeroValue(field));
        }
    }

    if let Some(raw) = &config.health.object_storage_url {
        match url::Url::parse(raw) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(ValidationError::InvalidStorageUrl {
                url: raw.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            }),
            Err(e) => errors.push(ValidationError::InvalidStorageUrl {
                url: raw.clone(),
                reason: e.to_string(),
            }),
        }
    }

    if config.storage_init.base_delay_ms > config.storage_init.max_delay_ms {
        errors.push(ValidationError::BackoffRange {
            base: config.storage_init.base_delay_ms,
            max: config.storage_init.max_delay_ms,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GovernorConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GovernorConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.rate_limit.period_ms = 0;
        config.shutdown.drain_timeout_secs = 0;
        config.health.object_storage_url = Some("ftp://bucket".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::ZeroValue("rate_limit.period_ms")));
        assert!(errors.contains(&ValidationError::ZeroValue("shutdown.drain_timeout_secs")));
        assert!(matches!(errors[0], ValidationError::InvalidBindAddress(_)));
    }

    #[test]
    fn test_zero_calls_is_allowed() {
        // A zero budget is a legal way to reject all traffic.
        let mut config = GovernorConfig::default();
        config.rate_limit.calls = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_backoff_range() {
        let mut config = GovernorConfig::default();
        config.storage_init.base_delay_ms = 10_000;
        config.storage_init.max_delay_ms = 100;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::BackoffRange { base: 10_000, max: 100 }]
        );
    }
}
