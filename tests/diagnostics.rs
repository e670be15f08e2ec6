//! Router-level tests for the diagnostic endpoints and middleware stack.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;

use lifecycle_governor::config::{Environment, GovernorConfig};
use lifecycle_governor::error::ApiError;
use lifecycle_governor::health::{Dependency, HealthStatus};
use lifecycle_governor::http::{build_router, with_middleware};
use lifecycle_governor::lifecycle::BoxError;
use lifecycle_governor::Governor;

mod common;

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_liveness() {
    let governor = common::governor(Environment::Staging, common::healthy_probes());
    let response = build_router(governor).oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "staging");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_detailed_health_all_ok() {
    let governor = common::governor(Environment::Production, common::healthy_probes());
    let response = build_router(governor)
        .oneshot(get_request("/health/detailed"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["external-api-credential"]["status"], "configured");
    assert_eq!(body["dependencies"]["external-api-credential"]["mandatory"], true);
}

#[tokio::test]
async fn test_detailed_health_degraded_is_503() {
    let mut probes = common::healthy_probes();
    probes[3] = common::failing_probe(Dependency::Filesystem, "read-only file system");
    let governor = common::governor(Environment::Development, probes);

    let response = build_router(governor)
        .oneshot(get_request("/health/detailed"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = common::json_body(response).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["dependencies"]["filesystem"]["status"], "unhealthy");
    assert!(body["dependencies"]["filesystem"]["error"]
        .as_str()
        .unwrap()
        .contains("read-only file system"));
}

#[tokio::test]
async fn test_optional_cache_failure_stays_healthy() {
    let mut probes = common::healthy_probes();
    probes[0] = common::failing_probe(Dependency::Cache, "connection refused");
    let governor = common::governor(Environment::Development, probes);

    let response = build_router(governor)
        .oneshot(get_request("/health/detailed"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dependencies"]["cache"]["status"], "unhealthy");
    assert_eq!(body["dependencies"]["cache"]["mandatory"], false);
}

#[tokio::test]
async fn test_default_development_instance_is_healthy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = GovernorConfig::default();
    config.environment = Environment::Development;
    config.health.data_dir = dir.path().to_path_buf();

    let health = Governor::new(config).health().check().await;

    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.dependencies[&Dependency::Cache].status, HealthStatus::NotConfigured);
    assert_eq!(
        health.dependencies[&Dependency::ObjectStorage].status,
        HealthStatus::NotConfigured
    );
    assert_eq!(health.dependencies[&Dependency::Filesystem].status, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_missing_credential_only_matters_in_production() {
    let mut probes = common::healthy_probes();
    probes[2] = common::ok_probe(Dependency::ExternalApiCredential, HealthStatus::NotConfigured);

    let dev = common::governor(Environment::Development, probes.clone());
    let response = build_router(dev)
        .oneshot(get_request("/health/detailed"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let prod = common::governor(Environment::Production, probes);
    let response = build_router(prod)
        .oneshot(get_request("/health/detailed"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_background_tasks_lists_active_and_recent() {
    let governor = common::governor(Environment::Test, common::healthy_probes());
    let registry = governor.registry().clone();

    registry.submit("long-runner", |token| async move {
        token.cancelled().await;
        Ok::<(), BoxError>(())
    });
    registry.submit("doomed", |_| async { Err::<(), BoxError>("bucket missing".into()) });

    let observed = common::wait_until(std::time::Duration::from_secs(2), || {
        !registry.recent().is_empty()
    })
    .await;
    assert!(observed);

    let response = build_router(governor.clone())
        .oneshot(get_request("/health/background-tasks"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = common::json_body(response).await;
    assert_eq!(body["active_tasks"], 1);
    assert_eq!(body["tasks"][0]["name"], "long-runner");
    assert_eq!(body["tasks"][0]["done"], false);
    assert_eq!(body["tasks"][0]["cancelled"], false);
    assert!(body["tasks"][0]["id"].as_str().unwrap().starts_with("task-"));
    assert_eq!(body["recent"][0]["name"], "doomed");
    assert_eq!(body["recent"][0]["state"], "failed");
    assert_eq!(body["recent"][0]["exception"], "bucket missing");
    assert_eq!(body["stats"]["failed"], 1);
    assert_eq!(body["stats"]["submitted"], 2);

    governor.on_shutdown().await;
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let mut config = common::test_config(Environment::Development);
    config.rate_limit.calls = 2;
    config.rate_limit.period_ms = 60_000;
    let governor = Governor::with_probes(config, common::healthy_probes());
    let router = build_router(governor);

    for _ in 0..2 {
        let response = router.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router.clone().oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    let body = common::json_body(response).await;
    assert_eq!(body["error_code"], "RATE_LIMITED");
    assert!(body["user_action"].is_string());
}

#[tokio::test]
async fn test_forwarded_clients_have_separate_budgets() {
    let mut config = common::test_config(Environment::Development);
    config.rate_limit.calls = 1;
    config.rate_limit.trust_forwarded_for = true;
    let router = build_router(Governor::with_probes(config, common::healthy_probes()));

    let from = |ip: &str| {
        Request::builder()
            .uri("/health")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let a = router.clone().oneshot(from("198.51.100.1")).await.unwrap();
    let b = router.clone().oneshot(from("198.51.100.2")).await.unwrap();
    let a_again = router.clone().oneshot(from("198.51.100.1")).await.unwrap();

    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);
    assert_eq!(a_again.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_disabled() {
    let mut config = common::test_config(Environment::Development);
    config.rate_limit.enabled = false;
    config.rate_limit.calls = 0;
    let router = build_router(Governor::with_probes(config, common::healthy_probes()));

    let response = router.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_path_is_404_with_error_body() {
    let governor = common::governor(Environment::Development, common::healthy_probes());
    let response = build_router(governor)
        .oneshot(get_request("/nope"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = common::json_body(response).await;
    assert_eq!(body["error_code"], "NOT_FOUND");
    assert!(body["details"].as_str().unwrap().contains("/nope"));
}

#[tokio::test]
async fn test_request_id_is_generated_and_echoed() {
    let governor = common::governor(Environment::Development, common::healthy_probes());
    let router = build_router(governor);

    let response = router.clone().oneshot(get_request("/health")).await.unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "client-chosen-id")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "client-chosen-id");
}

async fn panicking_handler() -> &'static str {
    panic!("secret exploded")
}

async fn failing_handler() -> Result<&'static str, ApiError> {
    Err(ApiError::Internal("db password wrong".to_string()))
}

fn faulty_router(environment: Environment) -> Router {
    let governor = common::governor(environment, common::healthy_probes());
    let routes = Router::new()
        .route("/panic", get(panicking_handler))
        .route("/fail", get(failing_handler));
    with_middleware(routes, &governor)
}

#[tokio::test]
async fn test_internal_errors_are_detailed_in_development() {
    let router = faulty_router(Environment::Development);

    let response = router.clone().oneshot(get_request("/panic")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = common::json_body(response).await;
    assert_eq!(body["error_code"], "INTERNAL_ERROR");
    assert!(body["details"].as_str().unwrap().contains("secret exploded"));

    let response = router.oneshot(get_request("/fail")).await.unwrap();
    let body = common::json_body(response).await;
    assert_eq!(body["details"], "db password wrong");
}

#[tokio::test]
async fn test_internal_errors_are_redacted_in_production() {
    let router = faulty_router(Environment::Production);

    for path in ["/panic", "/fail"] {
        let response = router.clone().oneshot(get_request(path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = common::json_body(response).await;
        assert_eq!(body["error_code"], "INTERNAL_ERROR");
        let details = body["details"].as_str().unwrap();
        assert!(!details.contains("secret"));
        assert!(!details.contains("password"));
    }
}
