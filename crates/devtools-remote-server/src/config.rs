//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use devtools_remote_core::Addressing;
use devtools_remote_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Externally visible `host[:port]`; `localhost:{port}` when unset.
    pub public_host: Option<String>,
    /// Directory served for unmatched GET requests.
    pub static_dir: PathBuf,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue depth per connection.
    pub send_queue_capacity: usize,
    /// Ping interval in seconds.
    pub ping_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub pong_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            public_host: None,
            static_dir: PathBuf::from("web"),
            max_message_size: 16 * 1024 * 1024, // 16 MB
            send_queue_capacity: 1024,
            ping_interval_secs: 25,
            pong_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Build from loaded settings.
    pub fn from_settings(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            public_host: server.public_host.clone(),
            static_dir: PathBuf::from(&server.static_dir),
            max_message_size: server.max_message_size,
            send_queue_capacity: server.send_queue_capacity,
            ping_interval_secs: server.ping_interval_secs,
            pong_timeout_secs: server.pong_timeout_secs,
        }
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL addressing for target descriptors.
    pub fn addressing(&self) -> Addressing {
        Addressing::from_config(self.public_host.as_deref(), self.port)
    }

    /// Ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Pong timeout.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}
