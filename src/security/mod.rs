//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → before-interceptors
//!         → rate_limit.rs (token bucket per key, 429 on exhaustion)
//!     → handler
//! ```

pub mod rate_limit;

pub use rate_limit::Throttle;
