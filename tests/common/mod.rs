//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use lifecycle_governor::config::{Environment, GovernorConfig};
use lifecycle_governor::health::{Dependency, DependencyProbe, HealthStatus, ProbeError};
use lifecycle_governor::{Governor, HttpServer};

/// Probe that always reports the same result.
pub struct StubProbe {
    pub dependency: Dependency,
    pub result: Result<HealthStatus, String>,
}

#[async_trait]
impl DependencyProbe for StubProbe {
    fn dependency(&self) -> Dependency {
        self.dependency
    }

    async fn probe(&self) -> Result<HealthStatus, ProbeError> {
        self.result
            .clone()
            .map_err(ProbeError::UnexpectedResponse)
    }
}

pub fn ok_probe(dependency: Dependency, status: HealthStatus) -> Arc<dyn DependencyProbe> {
    Arc::new(StubProbe {
        dependency,
        result: Ok(status),
    })
}

pub fn failing_probe(dependency: Dependency, error: &str) -> Arc<dyn DependencyProbe> {
    Arc::new(StubProbe {
        dependency,
        result: Err(error.to_string()),
    })
}

/// Every dependency healthy and the credential configured.
pub fn healthy_probes() -> Vec<Arc<dyn DependencyProbe>> {
    vec![
        ok_probe(Dependency::Cache, HealthStatus::Healthy),
        ok_probe(Dependency::ObjectStorage, HealthStatus::Healthy),
        ok_probe(Dependency::ExternalApiCredential, HealthStatus::Configured),
        ok_probe(Dependency::Filesystem, HealthStatus::Healthy),
    ]
}

pub fn test_config(environment: Environment) -> GovernorConfig {
    let mut config = GovernorConfig::default();
    config.environment = environment;
    config.health.probe_timeout_ms = 500;
    config.shutdown.drain_timeout_secs = 2;
    config
}

pub fn governor(environment: Environment, probes: Vec<Arc<dyn DependencyProbe>>) -> Governor {
    Governor::with_probes(test_config(environment), probes)
}

/// Serve `governor` on an ephemeral port. Stops on `governor.on_shutdown()`.
pub async fn spawn_server(governor: &Governor) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(governor.clone());
    let shutdown = governor.shutdown().subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, shutdown).await;
    });
    addr
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Start a programmable HTTP backend; `f` picks each response's status.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = u16> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let status = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    503 => "503 Service Unavailable",
                    _ => "500 Internal Server Error",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status_text
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}
