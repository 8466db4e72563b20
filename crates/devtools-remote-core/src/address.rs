//! Data-channel addressing.
//!
//! A session's data channel lives at `/devtools/page/{sessionId}`. The
//! externally visible host is configurable, so every URL handed to a debugger
//! frontend is built through [`Addressing`].

use crate::ids::SessionId;

/// Path prefix shared by all data-channel addresses.
pub const DATA_CHANNEL_PREFIX: &str = "/devtools/page/";

/// Build the data-channel path for a session.
pub fn data_channel_path(session_id: &SessionId) -> String {
    format!("{DATA_CHANNEL_PREFIX}{session_id}")
}

/// Extract the session id from a data-channel path.
///
/// Returns `None` unless the path is exactly the prefix followed by one
/// non-empty segment.
pub fn parse_data_channel_path(path: &str) -> Option<SessionId> {
    let id = path.strip_prefix(DATA_CHANNEL_PREFIX)?;
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(SessionId::from_raw(id))
}

/// Builds externally visible URLs from the public host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Addressing {
    public_host: String,
}

impl Addressing {
    /// Use an explicit `host[:port]` (no scheme).
    pub fn new(public_host: impl Into<String>) -> Self {
        let host: String = public_host.into();
        Self {
            public_host: host.trim_end_matches('/').to_string(),
        }
    }

    /// Default addressing when no public host is configured.
    pub fn localhost(port: u16) -> Self {
        Self::new(format!("localhost:{port}"))
    }

    /// Configured host, or `localhost:{port}` when none is set.
    pub fn from_config(public_host: Option<&str>, port: u16) -> Self {
        match public_host.filter(|h| !h.is_empty()) {
            Some(host) => Self::new(host),
            None => Self::localhost(port),
        }
    }

    /// The public `host[:port]`.
    pub fn public_host(&self) -> &str {
        &self.public_host
    }

    /// Scheme-less address a frontend connects to, e.g.
    /// `localhost:8000/devtools/page/sess_...`.
    pub fn data_channel_address(&self, session_id: &SessionId) -> String {
        format!("{}{}", self.public_host, data_channel_path(session_id))
    }

    /// `ws://` URL for the data channel.
    pub fn web_socket_debugger_url(&self, session_id: &SessionId) -> String {
        format!("ws://{}", self.data_channel_address(session_id))
    }

    /// Frontend launch URL served from the bundled frontend.
    pub fn devtools_frontend_url(&self, session_id: &SessionId) -> String {
        format!(
            "/devtools/devtools.html?ws={}",
            self.data_channel_address(session_id)
        )
    }

    /// Launch URL for the browser's built-in inspector.
    pub fn devtools_url(&self, session_id: &SessionId) -> String {
        format!(
            "chrome-devtools://devtools/bundled/inspector.html?wss={}&remoteFrontend=true&dockSide=unlocked&experiments=true",
            self.data_channel_address(session_id)
        )
    }
}
