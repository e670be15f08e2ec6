//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (derive client key, check fixed-window budget)
//!     → 429 + Retry-After on rejection, otherwise pass to handlers
//! ```
//!
//! # Design Decisions
//! - Admission runs before any handler logic
//! - The limiter is a pure predicate; HTTP semantics live in the middleware
//! - Rejections are expected client behaviour, not faults

pub mod rate_limit;

pub use rate_limit::{RateDecision, RateLimiter};
