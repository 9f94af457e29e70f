//! Metrics collection and export for Tally.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "tally_connections_total";
    pub const CLIENTS_REGISTERED: &str = "tally_clients_registered";
    pub const COMMANDS_TOTAL: &str = "tally_commands_total";
    pub const COMMANDS_DROPPED: &str = "tally_commands_dropped_total";
    pub const EVENTS_WRITTEN: &str = "tally_events_written_total";
    pub const PROCESSING_SECONDS: &str = "tally_command_processing_seconds";
    pub const ERRORS_TOTAL: &str = "tally_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CLIENTS_REGISTERED,
        "Current number of clients receiving events"
    );
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Commands applied, by kind");
    metrics::describe_counter!(
        names::COMMANDS_DROPPED,
        "Inbound payloads dropped without an event, by reason"
    );
    metrics::describe_counter!(names::EVENTS_WRITTEN, "Events written to client sockets");
    metrics::describe_histogram!(
        names::PROCESSING_SECONDS,
        "Time from payload receipt to event publish, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of transport errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection on either endpoint.
pub fn record_connection(endpoint: &'static str) {
    counter!(names::CONNECTIONS_TOTAL, "endpoint" => endpoint).increment(1);
}

/// Update the registered client count.
pub fn set_registered_clients(count: usize) {
    gauge!(names::CLIENTS_REGISTERED).set(count as f64);
}

/// Record an applied command.
pub fn record_command(kind: &str, seconds: f64) {
    counter!(names::COMMANDS_TOTAL, "kind" => kind.to_string()).increment(1);
    histogram!(names::PROCESSING_SECONDS).record(seconds);
}

/// Record a dropped inbound payload.
pub fn record_dropped(reason: &'static str) {
    counter!(names::COMMANDS_DROPPED, "reason" => reason).increment(1);
}

/// Record an event written to a client.
pub fn record_event_written() {
    counter!(names::EVENTS_WRITTEN).increment(1);
}

/// Record a transport error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}
