//! Error types for the registry and the control-channel protocol.

use thiserror::Error;

use crate::ids::SessionId;

/// Errors raised by [`SessionRegistry`](crate::registry::SessionRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No live session has this id.
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}

/// Errors raised while decoding control- or data-channel text.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A data-channel frame was not valid JSON.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
    /// A control-channel message was not a `{type, data}` envelope.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    /// The event requires a payload but none was sent.
    #[error("event '{0}' requires a data payload")]
    MissingData(String),
    /// Encoding an outbound envelope failed.
    #[error("failed to encode '{event}': {source}")]
    Encode {
        /// Event type being encoded.
        event: &'static str,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame(_) => "malformed_frame",
            Self::MalformedEnvelope(_) => "malformed_envelope",
            Self::MissingData(_) => "missing_data",
            Self::Encode { .. } => "encode",
        }
    }
}
