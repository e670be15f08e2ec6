//! Diagnostic endpoint handlers.

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Environment;
use crate::error::ApiError;
use crate::lifecycle::registry::{FinishedTask, RegistryStats, TaskSnapshot};
use crate::lifecycle::Governor;

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
    pub environment: Environment,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct BackgroundTasksResponse {
    pub active_tasks: usize,
    pub tasks: Vec<TaskSnapshot>,
    /// Recently finished tasks, oldest first.
    pub recent: Vec<FinishedTask>,
    pub stats: RegistryStats,
}

/// `GET /health`: the process is up. Never probes dependencies.
pub async fn health(State(governor): State<Governor>) -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "healthy",
        environment: governor.config().environment,
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /health/detailed`: probe every dependency; 503 when degraded.
pub async fn health_detailed(State(governor): State<Governor>) -> impl IntoResponse {
    let health = governor.health().check().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health))
}

/// `GET /health/background-tasks`: registry snapshot.
pub async fn background_tasks(State(governor): State<Governor>) -> Json<BackgroundTasksResponse> {
    let registry = governor.registry();
    let tasks = registry.list_active();
    Json(BackgroundTasksResponse {
        active_tasks: tasks.len(),
        tasks,
        recent: registry.recent(),
        stats: registry.stats(),
    })
}

pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
