//! Diagnostic HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection (peer address attached)
//!     → request.rs (x-request-id, tracing span)
//!     → error::fault_boundary (500 detail per environment)
//!     → security::rate_limit (429 + Retry-After)
//!     → handlers.rs (/health, /health/detailed, /health/background-tasks)
//! ```

pub mod handlers;
pub mod request;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{build_router, with_middleware, HttpServer};
