//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): completed requests by status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_pool_active_clients` (gauge): leased clients per destination
//! - `gateway_pool_replacements_total` (counter): purged clients replaced, per destination
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Status 499 marks requests whose client went away

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::client_pool::DestinationKey;

/// Install the Prometheus exporter with its own HTTP listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, elapsed: Duration) {
    ::metrics::counter!("gateway_requests_total", "status" => status.to_string()).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_pool_active(destination: &DestinationKey, active: usize) {
    ::metrics::gauge!("gateway_pool_active_clients", "destination" => destination.to_string()).set(active as f64);
}

pub fn record_replacements(destination: &DestinationKey, replaced: usize) {
    if replaced > 0 {
        ::metrics::counter!("gateway_pool_replacements_total", "destination" => destination.to_string())
            .increment(replaced as u64);
    }
}
