//! Composition root for the lifecycle components.

use std::sync::Arc;

use crate::config::GovernorConfig;
use crate::health::{probes::default_probes, DependencyProbe, HealthAggregator, MandatoryPolicy};
use crate::lifecycle::registry::{TaskHandle, TaskRegistry};
use crate::lifecycle::shutdown::{DrainReport, Shutdown, ShutdownCoordinator};
use crate::lifecycle::startup::{sweep_rate_limits, StorageInitializer};
use crate::security::RateLimiter;

/// Owns the single instance of every lifecycle component.
///
/// Cloning is cheap; clones share the same components. This is also the
/// HTTP router's state.
#[derive(Clone)]
pub struct Governor {
    config: Arc<GovernorConfig>,
    registry: TaskRegistry,
    limiter: Arc<RateLimiter>,
    health: Arc<HealthAggregator>,
    coordinator: Arc<ShutdownCoordinator>,
    shutdown: Arc<Shutdown>,
}

impl Governor {
    /// Build the governor with the standard dependency probes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: GovernorConfig) -> Self {
        let probes = default_probes(&config.health);
        Self::with_probes(config, probes)
    }

    /// Build the governor with a custom probe set.
    pub fn with_probes(config: GovernorConfig, probes: Vec<Arc<dyn DependencyProbe>>) -> Self {
        let registry = TaskRegistry::new(config.tasks.history_limit);
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let health = Arc::new(HealthAggregator::new(
            probes,
            MandatoryPolicy::with_overrides(&config.health.policy),
            config.environment,
            config.health.probe_timeout(),
        ));
        let coordinator = Arc::new(ShutdownCoordinator::new(registry.clone()));

        Self {
            config: Arc::new(config),
            registry,
            limiter,
            health,
            coordinator,
            shutdown: Arc::new(Shutdown::new()),
        }
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn health(&self) -> &HealthAggregator {
        &self.health
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Submit startup work to the registry.
    pub fn on_startup(&self) -> Vec<TaskHandle> {
        let mut handles = Vec::new();

        let storage = &self.config.storage_init;
        match &self.config.health.object_storage_url {
            Some(url) if storage.enabled => {
                let initializer = StorageInitializer::new(url.clone(), storage.clone());
                handles.push(
                    self.registry
                        .submit("storage-init", move |token| initializer.run(token)),
                );
            }
            _ => tracing::debug!("Object storage initialization skipped"),
        }

        if self.config.rate_limit.enabled {
            let limiter = self.limiter.clone();
            let interval = self.config.rate_limit.sweep_interval();
            handles.push(self.registry.submit("rate-limit-sweeper", move |token| {
                sweep_rate_limits(limiter, interval, token)
            }));
        }

        tracing::info!(tasks = handles.len(), "Startup tasks submitted");
        handles
    }

    /// Stop listeners and drain background work within the configured deadline.
    pub async fn on_shutdown(&self) -> DrainReport {
        self.shutdown.trigger();
        self.coordinator
            .drain(self.config.shutdown.drain_timeout())
            .await
    }
}
