//! Connection capability shared by both channel kinds.
//!
//! A transport exposes itself to the registry and relay as a [`FrameSink`].
//! Inbound frames and the close notification are driven by the transport's
//! own reader loop, which calls into [`Relay`](crate::relay::Relay).

use std::sync::Arc;

/// WebSocket close status plus a human-readable reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CloseReason {
    /// Close status code.
    pub code: u16,
    /// Reason sent in the close frame.
    pub reason: &'static str,
}

impl CloseReason {
    /// Ordinary close once the connection is done.
    pub const NORMAL: Self = Self {
        code: 1000,
        reason: "",
    };
    /// Data channel addressed a session that does not exist.
    pub const NO_MATCHING_SESSION: Self = Self {
        code: 1011,
        reason: "no matching session",
    };
    /// The owning control channel disconnected.
    pub const SESSION_ENDED: Self = Self {
        code: 1001,
        reason: "session ended",
    };
    /// A newer data channel took over the session.
    pub const REPLACED: Self = Self {
        code: 4001,
        reason: "replaced by a newer data channel",
    };
    /// Peer stopped answering pings.
    pub const UNRESPONSIVE: Self = Self {
        code: 1001,
        reason: "ping timeout",
    };
    /// Server is shutting down.
    pub const SHUTDOWN: Self = Self {
        code: 1001,
        reason: "server shutting down",
    };
}

/// Send/close capability of one connection.
pub trait FrameSink: Send + Sync {
    /// Connection id, for logs.
    fn id(&self) -> &str;

    /// Queue a text frame. Returns `false` if it was dropped (queue full or
    /// connection gone); never blocks.
    fn send(&self, frame: Arc<str>) -> bool;

    /// Ask the transport to close with the given status. Idempotent.
    fn close(&self, reason: CloseReason);
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn no_matching_session_is_abnormal_closure() {
        assert_eq!(CloseReason::NO_MATCHING_SESSION.code, 1011);
        assert_eq!(CloseReason::NO_MATCHING_SESSION.reason, "no matching session");
    }

    #[test]
    fn recording_sink_stops_after_close() {
        let sink = RecordingSink::new("c1");
        assert!(sink.send("a".into()));
        sink.close(CloseReason::SESSION_ENDED);
        sink.close(CloseReason::REPLACED);
        assert!(!sink.send("b".into()));
        assert_eq!(sink.frames(), vec!["a".to_string()]);
        assert_eq!(sink.close_reason(), Some(CloseReason::SESSION_ENDED));
    }
}
