//! Background work submitted at startup.
//!
//! # Responsibilities
//! - Initialize remote object storage, retrying with backoff
//! - Periodically evict stale rate-limit windows
//!
//! Both loops watch their cancellation token and return promptly once it
//! fires, so a drain observes them as cancelled rather than abandoned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::StorageInitConfig;
use crate::health::probes::head;
use crate::lifecycle::registry::BoxError;
use crate::resilience::Backoff;
use crate::security::RateLimiter;

/// Run `attempt` until it succeeds, `max_attempts` is reached, or `token` fires.
///
/// Returns `Ok(())` on success and on cancellation; the last error otherwise.
pub async fn retry_with_backoff<F, Fut>(
    token: &CancellationToken,
    backoff: Backoff,
    max_attempts: u32,
    operation: &str,
    mut attempt: F,
) -> Result<(), BoxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), BoxError>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        let result = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            result = attempt() => result,
        };

        let error = match result {
            Ok(()) => {
                tracing::info!(operation, attempts = tries, "Startup operation succeeded");
                return Ok(());
            }
            Err(e) => e,
        };

        if tries >= max_attempts {
            tracing::error!(operation, attempts = tries, error = %error, "Startup operation gave up");
            return Err(error);
        }

        let delay = backoff.delay(tries);
        tracing::warn!(
            operation,
            attempt = tries,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "Startup operation failed, retrying"
        );
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Confirms the remote object store answers before traffic depends on it.
pub struct StorageInitializer {
    url: String,
    config: StorageInitConfig,
    client: Client<HttpConnector, Body>,
}

impl StorageInitializer {
    pub fn new(url: String, config: StorageInitConfig) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            url,
            config,
            client,
        }
    }

    async fn attempt(&self) -> Result<(), BoxError> {
        let status = head(&self.client, &self.url).await?;
        if status.is_server_error() {
            return Err(format!("object storage returned {}", status).into());
        }
        Ok(())
    }

    pub async fn run(self, token: CancellationToken) -> Result<(), BoxError> {
        retry_with_backoff(
            &token,
            Backoff::from_config(&self.config),
            self.config.max_attempts,
            "storage-init",
            || self.attempt(),
        )
        .await
    }
}

/// Evict stale rate-limit windows every `interval` until cancelled.
pub async fn sweep_rate_limits(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    token: CancellationToken,
) -> Result<(), BoxError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                let evicted = limiter.evict_stale(Instant::now());
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = limiter.tracked_keys(), "Evicted stale rate-limit windows");
                }
            }
        }
    }
}
