//! `/health`, `/_stats` and `/` response bodies.

use std::time::Instant;

use devtools_remote_core::RegistryStats;
use serde::Serialize;

/// Body of `GET /`.
pub const GREETING: &str = "Hello from DevToolsRemote";

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"`, or `"draining"` once shutdown has begun.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Current WebSocket connection count.
    pub connections: usize,
    /// Number of live sessions.
    pub active_sessions: usize,
    /// Sessions with a bound data channel.
    pub bound_sessions: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    stats: RegistryStats,
    shutting_down: bool,
) -> HealthResponse {
    HealthResponse {
        status: if shutting_down { "draining" } else { "ok" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        active_sessions: stats.sessions,
        bound_sessions: stats.bindings,
    }
}

/// Body of `GET /_stats`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsResponse {
    /// Live counts.
    pub count: RegistryStats,
}
