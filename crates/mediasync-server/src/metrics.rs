//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup. Metrics recorded before installation are discarded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound messages routed total (counter, labels: kind).
pub const RELAY_MESSAGES_TOTAL: &str = "relay_messages_total";
/// Inbound messages dropped as malformed (counter).
pub const RELAY_MALFORMED_MESSAGES_TOTAL: &str = "relay_malformed_messages_total";
/// Payloads a peer could not accept during fan-out (counter, labels: reason).
pub const RELAY_BROADCAST_DROPS_TOTAL: &str = "relay_broadcast_drops_total";
/// Peers disconnected for failing to accept a broadcast (counter).
pub const RELAY_EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Non-empty rooms (gauge).
pub const RELAY_ROOMS_ACTIVE: &str = "relay_rooms_active";
