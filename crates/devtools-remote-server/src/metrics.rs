//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Call once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ServerError::Metrics(e.to_string()))?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened (counter, labels: channel).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter, labels: channel).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge, labels: channel).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram, labels: channel).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Frames dropped because a send queue was full (counter, labels: channel).
pub const WS_SEND_QUEUE_DROPS_TOTAL: &str = "ws_send_queue_drops_total";
/// Connections closed for missing pongs (counter, labels: channel).
pub const WS_PING_TIMEOUTS_TOTAL: &str = "ws_ping_timeouts_total";
/// Live sessions (gauge).
pub const RELAY_SESSIONS_ACTIVE: &str = "relay_sessions_active";
/// Targets announced (counter).
pub const RELAY_TARGETS_TOTAL: &str = "relay_targets_total";
/// Session lifetime in seconds (histogram).
pub const RELAY_SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";
/// Frames forwarded (counter, labels: direction, outcome).
pub const RELAY_FRAMES_TOTAL: &str = "relay_frames_total";
/// Frames discarded as malformed (counter, labels: channel).
pub const RELAY_MALFORMED_FRAMES_TOTAL: &str = "relay_malformed_frames_total";
/// Data channels rejected for an unknown session (counter).
pub const RELAY_DATA_CHANNELS_REJECTED_TOTAL: &str = "relay_data_channels_rejected_total";
/// Data channels displaced by a newer one (counter).
pub const RELAY_DATA_CHANNELS_REPLACED_TOTAL: &str = "relay_data_channels_replaced_total";
