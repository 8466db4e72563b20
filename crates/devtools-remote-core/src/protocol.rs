//! Control-channel wire envelope.
//!
//! Every control-channel text frame is `{"type": <event>, "data": <payload>}`.
//! Protocol frames travel inside `data` as raw JSON and are never re-encoded,
//! so the bytes a peer sends are the bytes the other peer receives.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::errors::ProtocolError;
use crate::ids::SessionId;
use crate::target::Announcement;

/// Client announces a debuggable target.
pub const HELLO: &str = "hello";
/// Server reports the session id after a `hello`.
pub const SESSION_CREATED: &str = "sessionCreated";
/// Server delivers a frame from the data channel.
pub const DATA_REQUEST: &str = "data.request";
/// Client relays a protocol response toward the data channel.
pub const DATA_RESPONSE: &str = "data.response";
/// Client relays a protocol event toward the data channel.
pub const DATA_EVENT: &str = "data.event";

/// A decoded inbound control-channel message.
#[derive(Debug)]
pub enum ControlMessage {
    /// `hello` announcement.
    Hello(Announcement),
    /// `data.response` frame for the data channel.
    DataResponse(Box<RawValue>),
    /// `data.event` frame for the data channel.
    DataEvent(Box<RawValue>),
    /// Any other event type; ignored by the handler.
    Unknown(String),
}

impl ControlMessage {
    /// Event type as it appeared on the wire.
    pub fn event(&self) -> &str {
        match self {
            Self::Hello(_) => HELLO,
            Self::DataResponse(_) => DATA_RESPONSE,
            Self::DataEvent(_) => DATA_EVENT,
            Self::Unknown(kind) => kind,
        }
    }
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Box<RawValue>>,
}

#[derive(Serialize)]
struct OutboundEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a RawValue,
}

/// Decode one control-channel text frame.
pub fn parse_control_message(text: &str) -> Result<ControlMessage, ProtocolError> {
    let envelope: InboundEnvelope =
        serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)?;
    let InboundEnvelope { kind, data } = envelope;
    match kind.as_str() {
        HELLO => {
            let data = data.ok_or_else(|| ProtocolError::MissingData(kind.clone()))?;
            let announcement =
                serde_json::from_str(data.get()).map_err(ProtocolError::MalformedEnvelope)?;
            Ok(ControlMessage::Hello(announcement))
        }
        DATA_RESPONSE => data
            .map(ControlMessage::DataResponse)
            .ok_or(ProtocolError::MissingData(kind)),
        DATA_EVENT => data
            .map(ControlMessage::DataEvent)
            .ok_or(ProtocolError::MissingData(kind)),
        _ => Ok(ControlMessage::Unknown(kind)),
    }
}

/// Validate a data-channel text frame as JSON, keeping its exact bytes.
pub fn parse_frame(text: &str) -> Result<Box<RawValue>, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::MalformedFrame)
}

fn encode(event: &'static str, data: &RawValue) -> Result<String, ProtocolError> {
    serde_json::to_string(&OutboundEnvelope { kind: event, data })
        .map_err(|source| ProtocolError::Encode { event, source })
}

/// `sessionCreated` envelope carrying the session id.
pub fn session_created(session_id: &SessionId) -> Result<String, ProtocolError> {
    let data = serde_json::value::to_raw_value(session_id).map_err(|source| {
        ProtocolError::Encode {
            event: SESSION_CREATED,
            source,
        }
    })?;
    encode(SESSION_CREATED, &data)
}

/// `data.request` envelope wrapping a data-channel frame.
pub fn data_request(frame: &RawValue) -> Result<String, ProtocolError> {
    encode(DATA_REQUEST, frame)
}
