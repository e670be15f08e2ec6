//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the governor.
//! All types derive Serde traits for deserialization from config files.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::Dependency;

/// Deployment environment the process runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }

    /// Whether internal fault details may be returned to clients.
    pub fn exposes_internal_errors(&self) -> bool {
        matches!(self, Environment::Development | Environment::Test)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            "staging" | "stage" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Root configuration for the governor.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GovernorConfig {
    /// Environment name, drives error exposure and the mandatory-dependency policy.
    pub environment: Environment,

    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Shutdown drain settings.
    pub shutdown: ShutdownConfig,

    /// Task registry settings.
    pub tasks: TaskConfig,

    /// Dependency health checking.
    pub health: HealthConfig,

    /// Remote storage initialization performed at startup.
    pub storage_init: StorageInitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Calls admitted per window and client.
    pub calls: u32,

    /// Window length in milliseconds.
    pub period_ms: u64,

    /// Use the first `X-Forwarded-For` hop as the client key.
    pub trust_forwarded_for: bool,

    /// Interval between stale-window sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            calls: 100,
            period_ms: 60_000,
            trust_forwarded_for: false,
            sweep_interval_secs: 60,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on the background task drain in seconds.
    pub drain_timeout_secs: u64,
}

impl ShutdownConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { drain_timeout_secs: 5 }
    }
}

/// Task registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Number of finished tasks kept for diagnostics (0 disables history).
    pub history_limit: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self { history_limit: 32 }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Per-probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Cache service address (e.g., "127.0.0.1:6379").
    pub cache_address: Option<String>,

    /// Object storage endpoint probed with HEAD.
    pub object_storage_url: Option<String>,

    /// Directory used for the filesystem write test.
    pub data_dir: PathBuf,

    /// External API credential checks.
    pub credential: CredentialConfig,

    /// Environments in which each dependency is mandatory.
    /// Missing entries fall back to the built-in policy.
    pub policy: BTreeMap<Dependency, BTreeSet<Environment>>,
}

impl HealthConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 2_000,
            cache_address: None,
            object_storage_url: None,
            data_dir: PathBuf::from("./data"),
            credential: CredentialConfig::default(),
            policy: BTreeMap::new(),
        }
    }
}

/// External API credential configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Environment variable the credential is read from.
    pub env_var: String,

    /// Credential value. Populated from `env_var` when unset.
    #[serde(skip_serializing)]
    pub value: Option<String>,

    /// Required prefix (e.g., "sk-").
    pub required_prefix: Option<String>,

    /// Minimum accepted length.
    pub min_length: usize,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: "EXTERNAL_API_KEY".to_string(),
            value: None,
            required_prefix: None,
            min_length: 20,
        }
    }
}

/// Remote storage initialization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageInitConfig {
    /// Run the initializer at startup (requires `health.object_storage_url`).
    pub enabled: bool,

    /// Maximum number of attempts.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for StorageInitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
