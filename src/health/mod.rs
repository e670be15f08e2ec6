//! Dependency health checking.
//!
//! # Data Flow
//! ```text
//! Diagnostic request
//!     → HealthAggregator::check (aggregator.rs)
//!     → every DependencyProbe in parallel, each under a timeout (probes.rs)
//!     → per-dependency status + mandatory flag from MandatoryPolicy
//!     → fold: healthy iff every mandatory dependency is healthy/configured
//! ```
//!
//! # Design Decisions
//! - Checks run on demand; nothing is cached between requests
//! - A failing, hanging or panicking probe becomes `unhealthy`, never an error
//! - Which dependencies are mandatory depends on the environment

pub mod aggregator;
pub mod probe;
pub mod probes;

pub use aggregator::{AggregateHealth, HealthAggregator, MandatoryPolicy};
pub use probe::{Dependency, DependencyProbe, DependencyStatus, HealthStatus, ProbeError};
