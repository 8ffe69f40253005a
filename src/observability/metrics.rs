//! Metrics collection and exposition.
//!
//! # Metrics
//! - `setup_total` (counter): setup attempts by outcome
//! - `gateway_events_total` (counter): started, stopped, exited, crashed, spawn_failed
//! - `observer_connections` (gauge): open observer WebSockets
//! - `observer_broadcasts_total` (counter): broadcasts by event type

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub fn record_setup(outcome: &'static str) {
    metrics::counter!("setup_total", "outcome" => outcome).increment(1);
}

pub fn record_gateway_event(event: &'static str) {
    metrics::counter!("gateway_events_total", "event" => event).increment(1);
}

pub fn set_observer_connections(count: usize) {
    metrics::gauge!("observer_connections").set(count as f64);
}

pub fn record_broadcast(kind: &'static str) {
    metrics::counter!("observer_broadcasts_total", "type" => kind).increment(1);
}

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}
