//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server span (server = name)
//!     → request span (request_id, method, path)
//!     → logging.rs (subscriber: env filter + pretty/JSON fmt layer)
//!
//! Pipeline and connection tasks
//!     → metrics.rs (counters, gauges, histograms)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log line of a request via its span
//! - Metrics are cheap and become no-ops without a recorder

pub mod logging;
pub mod metrics;
