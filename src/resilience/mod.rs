//! Retry support for background work.
//!
//! Startup initializers that talk to remote services retry with
//! [`backoff::Backoff`]; waits between attempts are cancellable by the task
//! token, so a drain never waits out a backoff.

pub mod backoff;

pub use backoff::Backoff;
