//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::{Result, ServerError};

/// Install the Prometheus metrics recorder (global).
///
/// Call once at startup, before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally.
///
/// Renders empty output; used by tests and embedders that skip metrics.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format from the recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Transport errors reported by sessions (counter).
pub const WS_ERRORS_TOTAL: &str = "ws_errors_total";
/// Deliveries dropped on full outbound queues (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Inbound messages accepted for relay (counter).
pub const RELAY_MESSAGES_RECEIVED_TOTAL: &str = "relay_messages_received_total";
/// Broadcast fan-outs performed (counter).
pub const RELAY_BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Frames queued to recipients across all broadcasts (counter).
pub const RELAY_DELIVERIES_TOTAL: &str = "relay_deliveries_total";
