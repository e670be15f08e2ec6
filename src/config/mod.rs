//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, defaults for missing sections)
//!     → loader.rs (environment overrides: APP_ENV, CACHE_ADDRESS, ...)
//!     → validation.rs (semantic checks)
//!     → GovernorConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Environment variables win over the file, the file wins over defaults

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError};
pub use schema::{
    CredentialConfig, Environment, GovernorConfig, HealthConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, ShutdownConfig, StorageInitConfig, TaskConfig,
};
