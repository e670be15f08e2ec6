//! Request identification.
//!
//! Every request gets an `x-request-id` (generated as a UUID v4 unless the
//! client sent one) which is echoed on the response and recorded on the
//! request's tracing span.

use axum::{
    body::Body,
    http::{HeaderName, Request},
};
use tracing::Span;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request id header value, or `"-"` if absent or not valid text.
pub fn request_id<B>(request: &Request<B>) -> &str {
    request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-")
}

/// Span for `TraceLayer`, carrying the request id.
pub fn make_request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "http_request",
        request_id = %request_id(request),
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
    )
}
