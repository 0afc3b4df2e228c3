//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_dispatch_total` (counter): dispatches by gateway, action, outcome
//! - `bridge_dispatch_duration_seconds` (histogram): worker round-trip latency
//! - `bridge_transport_faults_total` (counter): faults by kind
//! - `direct_post_requests_total` (counter): HTTP requests by method, status

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime. Failure is logged and
/// metrics stay disabled.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(gateway: &str, action: &str, outcome: &'static str, start: Instant) {
    counter!(
        "bridge_dispatch_total",
        "gateway" => gateway.to_string(),
        "action" => action.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("bridge_dispatch_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_transport_fault(kind: &'static str) {
    counter!("bridge_transport_faults_total", "kind" => kind).increment(1);
}

pub fn record_direct_post(method: &str, status: u16) {
    counter!(
        "direct_post_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
