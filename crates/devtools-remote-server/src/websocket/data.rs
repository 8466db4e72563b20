//! Data-channel lifecycle: bind to the addressed session, relay frames to
//! its control channel, unbind on close.

use axum::extract::ws::WebSocket;
use devtools_remote_core::protocol;
use devtools_remote_core::{CloseReason, SessionId};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use super::connection::{Channel, ChannelKind};
use crate::metrics::{
    RELAY_DATA_CHANNELS_REJECTED_TOTAL, RELAY_DATA_CHANNELS_REPLACED_TOTAL, RELAY_FRAMES_TOTAL,
    RELAY_MALFORMED_FRAMES_TOTAL,
};
use crate::server::AppState;

/// Run a data channel for `session_id`.
///
/// Closes immediately with 1011 when the session does not exist. Otherwise
/// every valid JSON text frame is forwarded to the control channel as
/// `data.request`; malformed frames are dropped.
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_data_session(ws: WebSocket, session_id: SessionId, state: AppState) {
    let mut channel = Channel::open(
        ws,
        ChannelKind::Data,
        state.config.send_queue_capacity,
        state.keepalive,
        state.shutdown.connection_guard(),
    );
    let conn_id = channel.connection().connection_id().clone();
    let sink = channel.sink();

    let attachment = match state.relay.attach(&session_id, &sink) {
        Ok(attachment) => attachment,
        Err(e) => {
            counter!(RELAY_DATA_CHANNELS_REJECTED_TOTAL).increment(1);
            info!(%conn_id, error = %e, "rejecting data channel");
            channel.finish(CloseReason::NO_MATCHING_SESSION).await;
            return;
        }
    };
    if attachment.replaced {
        counter!(RELAY_DATA_CHANNELS_REPLACED_TOTAL).increment(1);
    }
    let binding = attachment.binding;
    info!(%conn_id, %binding, replaced = attachment.replaced, "data channel connected");

    let shutdown = state.shutdown.token();
    while let Some(text) = channel.next_text(&shutdown).await {
        let frame = match protocol::parse_frame(&text) {
            Ok(frame) => frame,
            Err(e) => {
                counter!(RELAY_MALFORMED_FRAMES_TOTAL, "channel" => "data").increment(1);
                debug!(%conn_id, error = %e, len = text.len(), "dropping malformed frame");
                continue;
            }
        };
        match state.relay.to_control_channel(&session_id, &frame) {
            Ok(delivery) => {
                counter!(RELAY_FRAMES_TOTAL, "direction" => "to_control", "outcome" => delivery.as_str())
                    .increment(1);
            }
            Err(e) => warn!(%conn_id, error = %e, "failed to relay frame"),
        }
    }

    let unbound = state.relay.detach(&session_id, &binding);
    info!(%conn_id, unbound, "data channel disconnected");
    drop(sink);
    channel.finish(CloseReason::NORMAL).await;
}
