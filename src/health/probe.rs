//! Dependency identities, statuses and the probe contract.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A dependency the service needs to serve traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dependency {
    Cache,
    ObjectStorage,
    ExternalApiCredential,
    Filesystem,
}

impl Dependency {
    pub const ALL: [Dependency; 4] = [
        Dependency::Cache,
        Dependency::ObjectStorage,
        Dependency::ExternalApiCredential,
        Dependency::Filesystem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Cache => "cache",
            Dependency::ObjectStorage => "object-storage",
            Dependency::ExternalApiCredential => "external-api-credential",
            Dependency::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a single dependency, or of the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Configured,
    NotConfigured,
    Degraded,
}

impl HealthStatus {
    /// Whether this status satisfies a mandatory dependency.
    pub fn is_ok(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Configured)
    }
}

/// Result of probing one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub status: HealthStatus,
    /// Whether the current environment requires this dependency.
    pub mandatory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Why a probe could not report a status.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    Connect(std::io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid configuration: {0}")]
    Misconfigured(String),
}

/// A check against one dependency.
///
/// Implementations may fail or hang; the aggregator bounds each call with a
/// timeout and converts every failure into an `unhealthy` status.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    fn dependency(&self) -> Dependency;

    async fn probe(&self) -> Result<HealthStatus, ProbeError>;
}
