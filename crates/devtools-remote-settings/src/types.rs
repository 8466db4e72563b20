//! Settings types.
//!
//! Every struct uses `#[serde(default)]` so a settings file only needs the
//! keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings for the relay.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Session analytics.
    pub analytics: AnalyticsSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Prometheus metrics.
    pub metrics: MetricsSettings,
}

impl RelaySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.send_queue_capacity == 0 {
            return Err(SettingsError::invalid(
                "server.sendQueueCapacity",
                "must be at least 1",
            ));
        }
        if server.ping_interval_secs == 0 {
            return Err(SettingsError::invalid(
                "server.pingIntervalSecs",
                "must be at least 1",
            ));
        }
        if server.pong_timeout_secs <= server.ping_interval_secs {
            return Err(SettingsError::invalid(
                "server.pongTimeoutSecs",
                format!(
                    "{} must exceed server.pingIntervalSecs ({})",
                    server.pong_timeout_secs, server.ping_interval_secs
                ),
            ));
        }
        if server.max_message_size < 1024 {
            return Err(SettingsError::invalid(
                "server.maxMessageSize",
                "must be at least 1024 bytes",
            ));
        }
        Ok(())
    }
}

/// HTTP/WebSocket listener settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` picks an ephemeral port).
    pub port: u16,
    /// Externally visible `host[:port]` used in target URLs.
    /// Defaults to `localhost:{port}` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
    /// Directory served as static files.
    pub static_dir: String,
    /// Largest accepted WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection before new ones are dropped.
    pub send_queue_capacity: usize,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
    /// Seconds without a pong before a connection is closed.
    pub pong_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_host: None,
            static_dir: "web".to_string(),
            max_message_size: 16 * 1024 * 1024,
            send_queue_capacity: 1024,
            ping_interval_secs: 25,
            pong_timeout_secs: 60,
        }
    }
}

/// Analytics sink settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsSettings {
    /// Mixpanel project token. Events are only logged when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixpanel_token: Option<String>,
    /// Mixpanel ingestion endpoint.
    pub endpoint: String,
    /// Log events locally when no token is configured.
    pub log_events: bool,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            mixpanel_token: None,
            endpoint: "https://api.mixpanel.com/track".to_string(),
            log_events: true,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Metrics settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder and serve `/metrics`.
    pub enabled: bool,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}
