//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define governor metrics (tasks, admissions, dependency health, drain)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `governor_tasks_submitted_total` (counter)
//! - `governor_tasks_finished_total` (counter): by outcome
//! - `governor_tasks_active` (gauge)
//! - `governor_rate_limited_total` (counter)
//! - `governor_rate_limit_keys` (gauge): tracked client windows
//! - `governor_dependency_health` (gauge): 1=ok, 0=not ok, by dependency
//! - `governor_drain_duration_seconds` (histogram)

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_task_submitted(active: usize) {
    counter!("governor_tasks_submitted_total").increment(1);
    gauge!("governor_tasks_active").set(active as f64);
}

pub fn record_task_finished(outcome: &'static str, active: usize) {
    counter!("governor_tasks_finished_total", "outcome" => outcome).increment(1);
    gauge!("governor_tasks_active").set(active as f64);
}

pub fn record_rate_limited() {
    counter!("governor_rate_limited_total").increment(1);
}

pub fn record_rate_limit_keys(keys: usize) {
    gauge!("governor_rate_limit_keys").set(keys as f64);
}

pub fn record_dependency_health(dependency: &'static str, ok: bool) {
    gauge!("governor_dependency_health", "dependency" => dependency)
        .set(if ok { 1.0 } else { 0.0 });
}

pub fn record_drain(elapsed: Duration) {
    histogram!("governor_drain_duration_seconds").record(elapsed.as_secs_f64());
}
