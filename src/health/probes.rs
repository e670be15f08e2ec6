//! Built-in dependency probes.
//!
//! Each probe reports `not_configured` when its target is not configured, so
//! the mandatory-dependency policy alone decides whether that matters.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::{CredentialConfig, HealthConfig};
use crate::health::probe::{Dependency, DependencyProbe, HealthStatus, ProbeError};

/// Cache service probe: TCP connect plus an inline `PING`.
pub struct CacheProbe {
    address: Option<String>,
}

impl CacheProbe {
    pub fn new(address: Option<String>) -> Self {
        Self { address }
    }
}

#[async_trait]
impl DependencyProbe for CacheProbe {
    fn dependency(&self) -> Dependency {
        Dependency::Cache
    }

    async fn probe(&self) -> Result<HealthStatus, ProbeError> {
        let Some(address) = &self.address else {
            return Ok(HealthStatus::NotConfigured);
        };

        let mut stream = TcpStream::connect(address.as_str())
            .await
            .map_err(ProbeError::Connect)?;
        stream
            .write_all(b"PING\r\n")
            .await
            .map_err(ProbeError::Connect)?;

        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.map_err(ProbeError::Connect)?;
        let reply = String::from_utf8_lossy(&buf[..n]);
        if reply.starts_with("+PONG") {
            Ok(HealthStatus::Healthy)
        } else {
            Err(ProbeError::UnexpectedResponse(reply.trim_end().to_string()))
        }
    }
}

/// Object storage reachability: `HEAD` against the configured endpoint.
pub struct ObjectStorageProbe {
    url: Option<String>,
    client: Client<HttpConnector, Body>,
}

impl ObjectStorageProbe {
    pub fn new(url: Option<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { url, client }
    }
}

/// Issue a `HEAD` request and return the status code.
pub(crate) async fn head(
    client: &Client<HttpConnector, Body>,
    url: &str,
) -> Result<axum::http::StatusCode, ProbeError> {
    let request = Request::builder()
        .method(Method::HEAD)
        .uri(url)
        .header("user-agent", "lifecycle-governor-health-check")
        .body(Body::empty())
        .map_err(|e| ProbeError::Misconfigured(e.to_string()))?;

    let response = client
        .request(request)
        .await
        .map_err(|e| ProbeError::Request(e.to_string()))?;
    Ok(response.status())
}

#[async_trait]
impl DependencyProbe for ObjectStorageProbe {
    fn dependency(&self) -> Dependency {
        Dependency::ObjectStorage
    }

    async fn probe(&self) -> Result<HealthStatus, ProbeError> {
        let Some(url) = &self.url else {
            return Ok(HealthStatus::NotConfigured);
        };

        let status = head(&self.client, url).await?;
        if status.is_server_error() {
            return Err(ProbeError::UnexpectedResponse(format!("status {}", status)));
        }
        Ok(HealthStatus::Healthy)
    }
}

/// Filesystem write test in the data directory.
pub struct FilesystemProbe {
    dir: PathBuf,
}

impl FilesystemProbe {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl DependencyProbe for FilesystemProbe {
    fn dependency(&self) -> Dependency {
        Dependency::Filesystem
    }

    async fn probe(&self) -> Result<HealthStatus, ProbeError> {
        let path = self
            .dir
            .join(format!(".health-probe-{}", uuid::Uuid::new_v4()));
        let payload = b"ok";

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, payload).await?;
        let read = tokio::fs::read(&path).await;
        let removed = tokio::fs::remove_file(&path).await;

        if read? != payload {
            return Err(ProbeError::UnexpectedResponse(
                "read back different content".to_string(),
            ));
        }
        removed?;
        Ok(HealthStatus::Healthy)
    }
}

/// External API credential format check. The value is never logged.
pub struct CredentialProbe {
    config: CredentialConfig,
}

impl CredentialProbe {
    pub fn new(config: CredentialConfig) -> Self {
        Self { config }
    }

    fn validate(&self, value: &str) -> Result<(), ProbeError> {
        if value.chars().any(char::is_whitespace) {
            return Err(ProbeError::Misconfigured(
                "credential contains whitespace".to_string(),
            ));
        }
        if value.len() < self.config.min_length {
            return Err(ProbeError::Misconfigured(format!(
                "credential shorter than {} characters",
                self.config.min_length
            )));
        }
        if let Some(prefix) = &self.config.required_prefix {
            if !value.starts_with(prefix.as_str()) {
                return Err(ProbeError::Misconfigured(format!(
                    "credential does not start with '{}'",
                    prefix
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DependencyProbe for CredentialProbe {
    fn dependency(&self) -> Dependency {
        Dependency::ExternalApiCredential
    }

    async fn probe(&self) -> Result<HealthStatus, ProbeError> {
        match self.config.value.as_deref() {
            None | Some("") => Ok(HealthStatus::NotConfigured),
            Some(value) => {
                self.validate(value)?;
                Ok(HealthStatus::Configured)
            }
        }
    }
}

/// The standard probe set for a health configuration.
pub fn default_probes(config: &HealthConfig) -> Vec<Arc<dyn DependencyProbe>> {
    vec![
        Arc::new(CacheProbe::new(config.cache_address.clone())),
        Arc::new(ObjectStorageProbe::new(config.object_storage_url.clone())),
        Arc::new(CredentialProbe::new(config.credential.clone())),
        Arc::new(FilesystemProbe::new(config.data_dir.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn credential(value: Option<&str>) -> CredentialProbe {
        CredentialProbe::new(CredentialConfig {
            value: value.map(str::to_string),
            required_prefix: Some("sk-".to_string()),
            min_length: 10,
            ..CredentialConfig::default()
        })
    }

    #[tokio::test]
    async fn test_credential_states() {
        assert_eq!(credential(None).probe().await.unwrap(), HealthStatus::NotConfigured);
        assert_eq!(
            credential(Some("sk-0123456789")).probe().await.unwrap(),
            HealthStatus::Configured
        );
        assert!(credential(Some("pk-0123456789")).probe().await.is_err());
        assert!(credential(Some("sk-1")).probe().await.is_err());
        assert!(credential(Some("sk-01234 56789")).probe().await.is_err());
    }

    #[tokio::test]
    async fn test_unconfigured_probes() {
        assert_eq!(CacheProbe::new(None).probe().await.unwrap(), HealthStatus::NotConfigured);
        assert_eq!(
            ObjectStorageProbe::new(None).probe().await.unwrap(),
            HealthStatus::NotConfigured
        );
    }

    #[tokio::test]
    async fn test_filesystem_probe_writes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let probe = FilesystemProbe::new(dir.path().join("nested"));
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Healthy);

        let leftovers = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_filesystem_probe_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let probe = FilesystemProbe::new(file);
        assert!(matches!(probe.probe().await, Err(ProbeError::Io(_))));
    }

    #[tokio::test]
    async fn test_cache_probe_against_fake_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let _ = socket.read(&mut buf).await;
            socket.write_all(b"+PONG\r\n").await.unwrap();
        });

        let probe = CacheProbe::new(Some(addr.to_string()));
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_cache_probe_connection_refused() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let probe = CacheProbe::new(Some(addr.to_string()));
        assert!(matches!(probe.probe().await, Err(ProbeError::Connect(_))));
    }
}
