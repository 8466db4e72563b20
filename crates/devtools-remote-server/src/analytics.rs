//! Session analytics.
//!
//! Emission is fire-and-forget: sinks never block the caller and failures
//! are logged, never surfaced to the relay path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use devtools_remote_core::{EndedSession, SessionId};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::errors::ServerError;

/// A session was announced with a target.
pub const SESSIONS_CREATED: &str = "sessions_created";
/// A session ended; carries start, end and duration.
pub const SESSION_ENDED: &str = "session_ended";
/// A session ended; id only.
pub const SESSIONS_DURATION: &str = "sessions_duration";

/// Observer for session lifecycle events.
pub trait AnalyticsSink: Send + Sync {
    /// Record one event. Must not block.
    fn record_event(&self, name: &str, properties: Value);
}

/// Properties for [`SESSIONS_CREATED`].
pub fn session_created_properties(session_id: &SessionId) -> Value {
    json!({ "sessionId": session_id })
}

/// Emit the two end-of-session events.
pub fn record_session_ended(sink: &dyn AnalyticsSink, ended: &EndedSession) {
    let start = ended.started_at.timestamp_millis();
    let duration = i64::try_from(ended.duration.as_millis()).unwrap_or(i64::MAX);
    sink.record_event(
        SESSION_ENDED,
        json!({
            "sessionId": ended.id,
            "startTime": start,
            "endTime": start.saturating_add(duration),
            "duration": duration,
        }),
    );
    sink.record_event(SESSIONS_DURATION, json!({ "sessionId": ended.id }));
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalytics;

impl AnalyticsSink for NoopAnalytics {
    fn record_event(&self, _name: &str, _properties: Value) {}
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnalytics;

impl AnalyticsSink for LogAnalytics {
    fn record_event(&self, name: &str, properties: Value) {
        info!(event = name, %properties, "analytics event");
    }
}

/// Keeps events in memory, for inspection.
#[derive(Debug, Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingAnalytics {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }

    /// Names of events recorded so far.
    pub fn names(&self) -> Vec<String> {
        self.events.lock().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn record_event(&self, name: &str, properties: Value) {
        self.events.lock().push((name.to_string(), properties));
    }
}

/// Sends events to the Mixpanel ingestion API.
pub struct MixpanelAnalytics {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl MixpanelAnalytics {
    /// Timeout for a single ingestion request.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Create a sink posting to `endpoint` with the project `token`.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Result<Self, ServerError> {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    fn payload(&self, name: &str, mut properties: Value) -> Value {
        if let Value::Object(map) = &mut properties {
            let _ = map.insert("token".into(), Value::String(self.token.clone()));
            let _ = map.insert("time".into(), json!(epoch_millis()));
            if let Some(session) = map.get("sessionId").cloned() {
                let _ = map.insert("distinct_id".into(), session);
            }
        }
        json!([{ "event": name, "properties": properties }])
    }
}

impl AnalyticsSink for MixpanelAnalytics {
    fn record_event(&self, name: &str, properties: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event = name, "no runtime available, dropping analytics event");
            return;
        };
        let body = self.payload(name, properties);
        let request = self.client.post(&self.endpoint).json(&body);
        let event = name.to_string();
        drop(runtime.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(event, "analytics event delivered");
                }
                Ok(resp) => {
                    warn!(event, status = %resp.status(), "analytics endpoint rejected event");
                }
                Err(e) => warn!(event, error = %e, "failed to deliver analytics event"),
            }
        }));
    }
}

fn epoch_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Pick a sink: Mixpanel when a token is configured, else log or discard.
pub fn from_settings(
    settings: &devtools_remote_settings::AnalyticsSettings,
) -> Result<Arc<dyn AnalyticsSink>, ServerError> {
    match settings.mixpanel_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => {
            info!(endpoint = %settings.endpoint, "mixpanel analytics enabled");
            Ok(Arc::new(MixpanelAnalytics::new(&settings.endpoint, token)?))
        }
        None if settings.log_events => Ok(Arc::new(LogAnalytics)),
        None => Ok(Arc::new(NoopAnalytics)),
    }
}
