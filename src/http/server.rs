//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router for the diagnostic endpoints
//! - Wire up middleware (tracing, request id, fault boundary, timeout,
//!   rate limiting)
//! - Serve with peer addresses attached and stop on the shutdown signal

use std::net::SocketAddr;
use std::time::Duration;

use axum::{middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::error::{fault_boundary, panic_response};
use crate::http::handlers;
use crate::http::request::{make_request_span, X_REQUEST_ID};
use crate::lifecycle::Governor;
use crate::security::rate_limit::{rate_limit_middleware, RateLimitState};

/// HTTP server for the diagnostic surface.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(governor: Governor) -> Self {
        Self {
            router: build_router(governor),
        }
    }

    /// Serve on `listener` until `shutdown` fires, then finish in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("HTTP server stopping");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Diagnostic routes with the full middleware stack.
pub fn build_router(governor: Governor) -> Router {
    let routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/health/background-tasks", get(handlers::background_tasks))
        .fallback(handlers::not_found)
        .with_state(governor.clone());

    with_middleware(routes, &governor)
}

/// Wrap `router` in the middleware stack.
///
/// Outer to inner: request id, trace, request id propagation, fault
/// boundary, panic catcher, timeout, rate limit.
#[allow(deprecated)]
pub fn with_middleware(router: Router, governor: &Governor) -> Router {
    let config = governor.config();
    let rate_limit = RateLimitState {
        limiter: governor.limiter().clone(),
        enabled: config.rate_limit.enabled,
        trust_forwarded_for: config.rate_limit.trust_forwarded_for,
    };

    router
        .layer(middleware::from_fn_with_state(rate_limit, rate_limit_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.listener.request_timeout_secs,
        )))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            config.environment,
            fault_boundary,
        ))
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
}
