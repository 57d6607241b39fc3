//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bridge_http_requests_total` (counter): requests by endpoint, status
//! - `bridge_http_request_duration_seconds` (histogram): handler latency
//! - `bridge_sessions_active` (gauge): sessions in the Active state
//! - `bridge_session_failures_total` (counter): session teardowns by reason
//! - `bridge_backend_replies_total` (counter): replies matched to a caller
//! - `bridge_push_notifications_dropped_total` (counter): unsolicited messages
//!
//! Calls are no-ops until a recorder is installed, so tests never need one.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Record a completed HTTP request.
pub fn record_request(endpoint: &'static str, status: u16, start: Instant) {
    counter!(
        "bridge_http_requests_total",
        "endpoint" => endpoint,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("bridge_http_request_duration_seconds", "endpoint" => endpoint)
        .record(start.elapsed().as_secs_f64());
}

/// A session finished its handshake.
pub fn session_activated() {
    gauge!("bridge_sessions_active").increment(1.0);
}

/// An Active session left the Active state.
pub fn session_deactivated() {
    gauge!("bridge_sessions_active").decrement(1.0);
}

/// A session ended because of a failure.
pub fn record_session_failure(reason: &'static str) {
    counter!("bridge_session_failures_total", "reason" => reason).increment(1);
}

/// A backend reply was handed to the queue head.
pub fn record_reply() {
    counter!("bridge_backend_replies_total").increment(1);
}

/// An unsolicited backend message was discarded.
pub fn record_push_dropped() {
    counter!("bridge_push_notifications_dropped_total").increment(1);
}
