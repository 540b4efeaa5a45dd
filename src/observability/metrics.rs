//! Metrics collection and exposition.
//!
//! # Metrics
//! - `switchyard_requests_total` (counter): requests by method, status
//! - `switchyard_request_duration_seconds` (histogram): latency distribution
//! - `switchyard_active_connections` (gauge): current connection count
//! - `switchyard_faults_total` (counter): faults by kind
//! - `switchyard_throttled_total` (counter): requests rejected by a throttle
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "switchyard_requests_total";
pub const REQUEST_DURATION: &str = "switchyard_request_duration_seconds";
pub const ACTIVE_CONNECTIONS: &str = "switchyard_active_connections";
pub const FAULTS_TOTAL: &str = "switchyard_faults_total";
pub const THROTTLED_TOTAL: &str = "switchyard_throttled_total";

/// Install the Prometheus recorder and its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, started: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    ::metrics::counter!(REQUESTS_TOTAL, &labels).increment(1);
    ::metrics::histogram!(REQUEST_DURATION, &labels).record(started.elapsed().as_secs_f64());
}

pub fn record_fault(kind: &'static str) {
    ::metrics::counter!(FAULTS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_throttled() {
    ::metrics::counter!(THROTTLED_TOTAL).increment(1);
}

pub fn connection_opened() {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}
