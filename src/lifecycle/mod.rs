//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (governor.rs → startup.rs):
//!     Governor::on_startup → submit storage initializer + rate-limit sweeper
//!
//! Running (registry.rs):
//!     submit → spawned unit of work → supervisor classifies outcome
//!     → completion channel → observer loop removes it from the active set
//!
//! Shutdown (signals.rs → shutdown.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger (HTTP server stops accepting)
//!     → ShutdownCoordinator::drain: cancel_all → wait ≤ deadline → abandon rest
//! ```
//!
//! # Design Decisions
//! - One owned registry per process, no global state
//! - Cancellation is cooperative; a task ignoring its token is abandoned at
//!   the deadline, not killed
//! - Task failures never reach the caller that submitted the task

pub mod governor;
pub mod registry;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use governor::Governor;
pub use registry::{BoxError, TaskHandle, TaskId, TaskRegistry, TaskSnapshot, TaskState};
pub use shutdown::{DrainReport, Shutdown, ShutdownCoordinator};
