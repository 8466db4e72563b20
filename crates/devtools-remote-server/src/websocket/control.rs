//! Control-channel lifecycle: one session per connection, from upgrade
//! through teardown.

use axum::extract::ws::WebSocket;
use devtools_remote_core::protocol::{self, ControlMessage};
use devtools_remote_core::{Announcement, CloseReason, FrameSink, SessionId};
use metrics::{counter, gauge, histogram};
use tracing::{debug, info, instrument, warn};

use super::connection::{Channel, ChannelKind};
use crate::analytics::{self, SESSIONS_CREATED};
use crate::metrics::{
    RELAY_FRAMES_TOTAL, RELAY_MALFORMED_FRAMES_TOTAL, RELAY_SESSION_DURATION_SECONDS,
    RELAY_SESSIONS_ACTIVE, RELAY_TARGETS_TOTAL,
};
use crate::server::AppState;

/// Run a control channel.
///
/// 1. Creates a session owned by this connection
/// 2. Registers a target and replies `sessionCreated` for every `hello`
/// 3. Relays `data.response` / `data.event` payloads to the data channel
/// 4. On disconnect, destroys the session (closing any data channel) and
///    emits the end-of-session analytics
pub async fn run_control_session(ws: WebSocket, state: AppState) {
    let channel = Channel::open(
        ws,
        ChannelKind::Control,
        state.config.send_queue_capacity,
        state.keepalive,
        state.shutdown.connection_guard(),
    );
    let session_id = state.relay.registry().create_session(channel.sink());
    control_loop(channel, session_id, state).await;
}

#[instrument(skip_all, fields(session_id = %session_id, conn_id = %channel.connection().connection_id()))]
async fn control_loop(mut channel: Channel, session_id: SessionId, state: AppState) {
    info!("control channel connected");
    gauge!(RELAY_SESSIONS_ACTIVE).increment(1.0);
    let shutdown = state.shutdown.token();

    while let Some(text) = channel.next_text(&shutdown).await {
        match protocol::parse_control_message(&text) {
            Ok(ControlMessage::Hello(announcement)) => {
                handle_hello(&channel, &session_id, announcement, &state);
            }
            Ok(ControlMessage::DataResponse(frame) | ControlMessage::DataEvent(frame)) => {
                let delivery = state.relay.to_data_channel(&session_id, &frame);
                counter!(RELAY_FRAMES_TOTAL, "direction" => "to_data", "outcome" => delivery.as_str())
                    .increment(1);
            }
            Ok(ControlMessage::Unknown(event)) => {
                debug!(event, "ignoring unknown control event");
            }
            Err(e) => {
                counter!(RELAY_MALFORMED_FRAMES_TOTAL, "channel" => "control").increment(1);
                warn!(error = %e, kind = e.error_kind(), "ignoring malformed control message");
            }
        }
    }

    if let Some(ended) = state.relay.teardown(&session_id) {
        histogram!(RELAY_SESSION_DURATION_SECONDS).record(ended.duration.as_secs_f64());
        analytics::record_session_ended(state.analytics.as_ref(), &ended);
        info!(
            duration_ms = u64::try_from(ended.duration.as_millis()).unwrap_or(u64::MAX),
            targets = ended.target_count,
            had_data_channel = ended.data_channel.is_some(),
            "control channel disconnected, session destroyed"
        );
    }
    gauge!(RELAY_SESSIONS_ACTIVE).decrement(1.0);
    channel.finish(CloseReason::NORMAL).await;
}

fn handle_hello(
    channel: &Channel,
    session_id: &SessionId,
    announcement: Announcement,
    state: &AppState,
) {
    let target = match state.relay.registry().add_target(session_id, announcement) {
        Ok(target) => target,
        Err(e) => {
            warn!(error = %e, "hello for a session that no longer exists");
            return;
        }
    };
    counter!(RELAY_TARGETS_TOTAL).increment(1);
    info!(
        target_id = %target.id,
        title = %target.title,
        url = %target.url,
        "target announced"
    );

    match protocol::session_created(session_id) {
        Ok(reply) => {
            if !channel.connection().send(reply.into()) {
                warn!("failed to enqueue sessionCreated (queue full or closed)");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode sessionCreated"),
    }

    state.analytics.record_event(
        SESSIONS_CREATED,
        analytics::session_created_properties(session_id),
    );
}
