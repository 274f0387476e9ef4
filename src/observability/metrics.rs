//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): data-plane requests by method, status
//! - `gateway_request_duration_seconds` (histogram): time to response head
//! - `gateway_instructions_total` (counter): applied instructions by command
//! - `gateway_backend_errors_total` (counter): failed exchanges by kind
//! - `gateway_routes` (gauge): registered routes
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_instruction(command: &'static str) {
    counter!("gateway_instructions_total", "command" => command).increment(1);
}

pub fn record_backend_error(kind: &'static str) {
    counter!("gateway_backend_errors_total", "kind" => kind).increment(1);
}

pub fn record_route_count(count: usize) {
    gauge!("gateway_routes").set(count as f64);
}
