//! Folding dependency probes into one verdict.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{future::join_all, FutureExt};
use serde::Serialize;

use crate::config::Environment;
use crate::error::panic_message;
use crate::health::probe::{Dependency, DependencyProbe, DependencyStatus, HealthStatus};
use crate::observability::metrics;

/// Which environments require which dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandatoryPolicy {
    rules: BTreeMap<Dependency, BTreeSet<Environment>>,
}

impl MandatoryPolicy {
    /// An empty policy: nothing is mandatory.
    pub fn none() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    /// Mark `dependency` mandatory in exactly `environments`.
    pub fn with_rule(
        mut self,
        dependency: Dependency,
        environments: impl IntoIterator<Item = Environment>,
    ) -> Self {
        self.rules
            .insert(dependency, environments.into_iter().collect());
        self
    }

    /// Default policy with entries replaced by `overrides`.
    pub fn with_overrides(overrides: &BTreeMap<Dependency, BTreeSet<Environment>>) -> Self {
        let mut policy = Self::default();
        for (dependency, environments) in overrides {
            policy.rules.insert(*dependency, environments.clone());
        }
        policy
    }

    pub fn is_mandatory(&self, dependency: Dependency, environment: Environment) -> bool {
        self.rules
            .get(&dependency)
            .is_some_and(|envs| envs.contains(&environment))
    }
}

impl Default for MandatoryPolicy {
    /// The filesystem is always required; the external API credential only
    /// in production. Cache and object storage are optional unless a
    /// configured policy says otherwise.
    fn default() -> Self {
        Self::none()
            .with_rule(
                Dependency::Filesystem,
                [
                    Environment::Development,
                    Environment::Test,
                    Environment::Staging,
                    Environment::Production,
                ],
            )
            .with_rule(Dependency::ExternalApiCredential, [Environment::Production])
    }
}

/// Overall verdict plus every dependency's status.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateHealth {
    pub status: HealthStatus,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
    pub dependencies: BTreeMap<Dependency, DependencyStatus>,
}

impl AggregateHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Probes every configured dependency on demand.
pub struct HealthAggregator {
    probes: Vec<Arc<dyn DependencyProbe>>,
    policy: MandatoryPolicy,
    environment: Environment,
    probe_timeout: Duration,
}

impl HealthAggregator {
    pub fn new(
        probes: Vec<Arc<dyn DependencyProbe>>,
        policy: MandatoryPolicy,
        environment: Environment,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            probes,
            policy,
            environment,
            probe_timeout,
        }
    }

    /// Probe every dependency concurrently and fold the results.
    ///
    /// Never fails: probe errors, timeouts and panics become `unhealthy`. A
    /// mandatory dependency without a probe is reported `unhealthy` as well.
    pub async fn check(&self) -> AggregateHealth {
        let results = join_all(self.probes.iter().map(|probe| self.run_probe(probe.as_ref()))).await;

        let mut dependencies = BTreeMap::new();
        for (dependency, mut status) in results {
            status.mandatory = self.policy.is_mandatory(dependency, self.environment);
            dependencies.insert(dependency, status);
        }
        for dependency in Dependency::ALL {
            if self.policy.is_mandatory(dependency, self.environment) {
                dependencies.entry(dependency).or_insert_with(|| DependencyStatus {
                    status: HealthStatus::Unhealthy,
                    mandatory: true,
                    error: Some("no probe registered".to_string()),
                    latency_ms: None,
                });
            }
        }
        for (dependency, status) in &dependencies {
            metrics::record_dependency_health(dependency.as_str(), status.status.is_ok());
        }

        let status = fold(&dependencies);
        if status != HealthStatus::Healthy {
            let failing: Vec<&str> = dependencies
                .iter()
                .filter(|(_, s)| s.mandatory && !s.status.is_ok())
                .map(|(d, _)| d.as_str())
                .collect();
            tracing::warn!(failing = ?failing, environment = %self.environment, "Service health degraded");
        }

        AggregateHealth {
            status,
            environment: self.environment,
            timestamp: Utc::now(),
            dependencies,
        }
    }

    async fn run_probe(&self, probe: &dyn DependencyProbe) -> (Dependency, DependencyStatus) {
        let dependency = probe.dependency();
        let started = Instant::now();
        let guarded = AssertUnwindSafe(probe.probe()).catch_unwind();
        let result = tokio::time::timeout(self.probe_timeout, guarded).await;
        let latency_ms = Some(started.elapsed().as_millis() as u64);

        let (status, error) = match result {
            Ok(Ok(Ok(status))) => (status, None),
            Ok(Ok(Err(e))) => (HealthStatus::Unhealthy, Some(e.to_string())),
            Ok(Err(payload)) => (HealthStatus::Unhealthy, Some(panic_message(payload.as_ref()))),
            Err(_) => (
                HealthStatus::Unhealthy,
                Some(format!(
                    "probe timed out after {}ms",
                    self.probe_timeout.as_millis()
                )),
            ),
        };

        if let Some(error) = &error {
            tracing::warn!(dependency = %dependency, error = %error, "Dependency probe failed");
        } else {
            tracing::debug!(dependency = %dependency, status = ?status, latency_ms = ?latency_ms, "Dependency probed");
        }

        (
            dependency,
            DependencyStatus {
                status,
                mandatory: false,
                error,
                latency_ms,
            },
        )
    }
}

/// `healthy` iff every mandatory dependency is healthy or configured.
pub fn fold(dependencies: &BTreeMap<Dependency, DependencyStatus>) -> HealthStatus {
    if dependencies
        .values()
        .filter(|s| s.mandatory)
        .all(|s| s.status.is_ok())
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}
