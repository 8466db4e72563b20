//! # devtools-remote-server
//!
//! Axum HTTP + WebSocket server for the DevTools remote relay.
//!
//! - `/control`: control channel from the browser extension, one session each
//! - `/devtools/page/{sessionId}`: data channel from a DevTools frontend
//! - `/{sessionId}/json`: target listing in the shape frontends expect
//! - `/_stats`, `/health`, `/metrics` and a static-file fallback
//!
//! Connections are counted against a [`ShutdownCoordinator`] so the server
//! can drain gracefully.

#![deny(unsafe_code)]

pub mod analytics;
pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use analytics::{AnalyticsSink, LogAnalytics, MixpanelAnalytics, NoopAnalytics, RecordingAnalytics};
pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::{AppState, RelayServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
