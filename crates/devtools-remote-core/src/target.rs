//! Debuggable targets announced over the control channel.

use serde::{Deserialize, Serialize};

use crate::address::Addressing;
use crate::ids::{SessionId, TargetId};

/// Payload of a `hello` announcement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Page title as reported by the client.
    #[serde(default)]
    pub title: String,
    /// Page URL as reported by the client.
    #[serde(default)]
    pub url: String,
}

/// A registered target, serialized in the shape DevTools frontends expect
/// from a `/json` listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Always empty for announced pages.
    pub description: String,
    /// Relative launch URL for the bundled frontend.
    pub devtools_frontend_url: String,
    /// Launch URL for the browser's built-in inspector.
    pub devtools_url: String,
    /// Target id, distinct from every session id.
    pub id: TargetId,
    /// Client-supplied title.
    pub title: String,
    /// Target kind; always `"page"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Client-supplied URL.
    pub url: String,
    /// `ws://` address of the session's data channel.
    pub web_socket_debugger_url: String,
}

impl Target {
    /// Kind reported for every announced target.
    pub const PAGE: &'static str = "page";

    /// Build a target for `session_id` with a fresh id.
    pub fn new(session_id: &SessionId, announcement: Announcement, addressing: &Addressing) -> Self {
        Self {
            description: String::new(),
            devtools_frontend_url: addressing.devtools_frontend_url(session_id),
            devtools_url: addressing.devtools_url(session_id),
            id: TargetId::new(),
            title: announcement.title,
            kind: Self::PAGE.to_string(),
            url: announcement.url,
            web_socket_debugger_url: addressing.web_socket_debugger_url(session_id),
        }
    }

    /// Scheme-less data-channel address.
    pub fn data_channel_address(&self) -> &str {
        self.web_socket_debugger_url
            .strip_prefix("ws://")
            .unwrap_or(&self.web_socket_debugger_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_target() -> Target {
        Target::new(
            &SessionId::from_raw("sess_1"),
            Announcement {
                title: "Tab1".into(),
                url: "http://example.com".into(),
            },
            &Addressing::localhost(8000),
        )
    }

    #[test]
    fn listing_shape() {
        let value = serde_json::to_value(make_target()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "description",
                "devtoolsFrontendUrl",
                "devtoolsUrl",
                "id",
                "title",
                "type",
                "url",
                "webSocketDebuggerUrl",
            ]
        );
        assert_eq!(value["type"], "page");
        assert_eq!(value["description"], "");
        assert_eq!(value["title"], "Tab1");
        assert_eq!(value["url"], "http://example.com");
        assert_eq!(
            value["webSocketDebuggerUrl"],
            json!("ws://localhost:8000/devtools/page/sess_1")
        );
    }

    #[test]
    fn data_channel_address_strips_scheme() {
        let target = make_target();
        assert_eq!(target.data_channel_address(), "localhost:8000/devtools/page/sess_1");
    }

    #[test]
    fn announcement_fields_default_to_empty() {
        let a: Announcement = serde_json::from_str("{}").unwrap();
        assert_eq!(a, Announcement::default());
    }

    #[test]
    fn announcement_ignores_extra_fields() {
        let a: Announcement =
            serde_json::from_str(r#"{"title":"t","url":"u","favicon":"f"}"#).unwrap();
        assert_eq!(a.title, "t");
        assert_eq!(a.url, "u");
    }
}
