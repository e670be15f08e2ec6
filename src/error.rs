//! Error types shared across the governor.
//!
//! `ApiError` is the only error that reaches clients. Its body follows the
//! shape the frontend already parses:
//! `{ "error", "details", "user_action", "error_code" }`.

use std::any::Any;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::{ConfigError, Environment};

/// Errors that abort process startup.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to initialize logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Error body returned to HTTP clients.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub details: String,
    pub user_action: String,
    pub error_code: String,
}

/// Generic text used when internal details must not leave the process.
const INTERNAL_DETAILS_REDACTED: &str = "An unexpected error occurred.";

/// Internal fault detail attached to a 500 response for the fault boundary.
#[derive(Debug, Clone)]
pub struct InternalFault(pub String);

/// Errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Seconds to advertise in `Retry-After`, never less than one.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::RateLimited { retry_after } => {
                let secs = retry_after_secs(retry_after);
                let body = ErrorBody {
                    error: "Rate limit exceeded".to_string(),
                    details: format!("Too many requests. Retry after {} seconds.", secs),
                    user_action: "Wait a moment before retrying the request.".to_string(),
                    error_code: "RATE_LIMITED".to_string(),
                };
                let mut response = (status, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                response
            }
            ApiError::NotFound(path) => (
                status,
                Json(ErrorBody {
                    error: "Not found".to_string(),
                    details: format!("No resource at '{}'.", path),
                    user_action: "Check the request path.".to_string(),
                    error_code: "NOT_FOUND".to_string(),
                }),
            )
                .into_response(),
            ApiError::Internal(detail) => internal_error_response(detail),
        }
    }
}

/// Build a 500 response carrying its detail for the fault boundary.
///
/// The body starts redacted; [`fault_boundary`] reveals the detail in
/// environments that allow it.
pub fn internal_error_response(detail: String) -> Response {
    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(internal_body(INTERNAL_DETAILS_REDACTED.to_string())),
    )
        .into_response();
    response.extensions_mut().insert(InternalFault(detail));
    response
}

fn internal_body(details: String) -> ErrorBody {
    ErrorBody {
        error: "Internal server error".to_string(),
        details,
        user_action: "Please try again later.".to_string(),
        error_code: "INTERNAL_ERROR".to_string(),
    }
}

/// Outermost error boundary.
///
/// Responses carrying an [`InternalFault`] are logged; the detail is written
/// into the body only when the environment exposes internal errors.
pub async fn fault_boundary(
    State(environment): State<Environment>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let mut response = next.run(request).await;

    let Some(InternalFault(detail)) = response.extensions_mut().remove::<InternalFault>() else {
        return response;
    };

    tracing::error!(method = %method, path = %path, error = %detail, "Unhandled fault");

    if environment.exposes_internal_errors() {
        let (parts, _) = response.into_parts();
        let body = serde_json::to_vec(&internal_body(detail)).unwrap_or_default();
        let mut response = Response::from_parts(parts, Body::from(body));
        response.headers_mut().remove(header::CONTENT_LENGTH);
        return response;
    }
    response
}

/// Render a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {}", msg)
    } else {
        "panicked".to_string()
    }
}

/// `CatchPanicLayer` handler: turns a handler panic into a 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    internal_error_response(panic_message(payload.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(3)), 3);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_rate_limited_response() {
        let response = ApiError::RateLimited {
            retry_after: Duration::from_millis(2500),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");
    }

    #[test]
    fn test_internal_error_is_redacted_by_default() {
        let response = ApiError::Internal("db password wrong".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let fault = response.extensions().get::<InternalFault>().unwrap();
        assert_eq!(fault.0, "db password wrong");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(payload.as_ref()), "panicked: kaboom");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "panicked");
    }
}
