//! Application lifecycle governor.
//!
//! Tracks background work, drains it on shutdown under a deadline, gates
//! request volume per client and reports dependency health.

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::GovernorConfig;
pub use error::GovernorError;
pub use http::HttpServer;
pub use lifecycle::{Governor, Shutdown};
