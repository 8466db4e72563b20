//! Frame forwarding between a session's control and data channels.
//!
//! Delivery is at-most-once and unbuffered: a frame with no live peer is
//! dropped, and a frame the peer's queue cannot accept is dropped too.

use std::sync::Arc;

use serde_json::value::RawValue;
use tracing::{debug, trace};

use crate::channel::{CloseReason, FrameSink};
use crate::errors::{ProtocolError, RegistryError};
use crate::ids::{BindingId, SessionId};
use crate::protocol;
use crate::registry::{EndedSession, SessionRegistry};

/// Outcome of forwarding one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Queued on the peer.
    Delivered,
    /// No peer bound; dropped.
    NoPeer,
    /// Peer queue full or closed; dropped.
    Dropped,
}

impl Delivery {
    /// Label used in metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::NoPeer => "no_peer",
            Self::Dropped => "dropped",
        }
    }
}

fn deliver(sink: Option<Arc<dyn FrameSink>>, frame: &str) -> Delivery {
    match sink {
        None => Delivery::NoPeer,
        Some(sink) if sink.send(Arc::from(frame)) => Delivery::Delivered,
        Some(_) => Delivery::Dropped,
    }
}

/// Result of [`Relay::attach`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    /// Binding id to pass to [`Relay::detach`].
    pub binding: BindingId,
    /// Whether an earlier data channel was displaced and closed.
    pub replaced: bool,
}

/// Wires bound channel pairs together on top of a [`SessionRegistry`].
#[derive(Clone)]
pub struct Relay {
    registry: Arc<SessionRegistry>,
}

impl Relay {
    /// Relay over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Underlying registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind `channel` as the session's data channel, closing any channel it
    /// displaces with [`CloseReason::REPLACED`].
    pub fn attach(
        &self,
        session_id: &SessionId,
        channel: &Arc<dyn FrameSink>,
    ) -> Result<Attachment, RegistryError> {
        let outcome = self.registry.bind_data_channel(session_id, channel)?;
        let replaced = outcome.replaced_previous();
        if let Some(previous) = outcome.replaced {
            debug!(
                session_id = %session_id,
                conn_id = previous.id(),
                "closing replaced data channel"
            );
            previous.close(CloseReason::REPLACED);
        }
        Ok(Attachment {
            binding: outcome.binding,
            replaced,
        })
    }

    /// Release a data-channel binding. Stale bindings are ignored.
    pub fn detach(&self, session_id: &SessionId, binding: &BindingId) -> bool {
        self.registry.unbind_data_channel(session_id, binding)
    }

    /// Forward a control-side payload to the bound data channel verbatim.
    pub fn to_data_channel(&self, session_id: &SessionId, frame: &RawValue) -> Delivery {
        let delivery = deliver(self.registry.data_channel(session_id), frame.get());
        trace!(session_id = %session_id, delivery = delivery.as_str(), "control -> data");
        delivery
    }

    /// Forward a data-channel frame to the control channel as `data.request`.
    pub fn to_control_channel(
        &self,
        session_id: &SessionId,
        frame: &RawValue,
    ) -> Result<Delivery, ProtocolError> {
        let Some(control) = self.registry.control_channel(session_id) else {
            return Ok(Delivery::NoPeer);
        };
        let envelope = protocol::data_request(frame)?;
        let delivery = deliver(Some(control), &envelope);
        trace!(session_id = %session_id, delivery = delivery.as_str(), "data -> control");
        Ok(delivery)
    }

    /// Destroy the session and close its data channel, if one is bound.
    pub fn teardown(&self, session_id: &SessionId) -> Option<EndedSession> {
        let ended = self.registry.destroy_session(session_id)?;
        if let Some(data) = &ended.data_channel {
            data.close(CloseReason::SESSION_ENDED);
        }
        Some(ended)
    }
}
