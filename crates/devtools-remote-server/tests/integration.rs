//! End-to-end tests against a live relay using real WebSocket and HTTP clients.

use std::sync::Arc;
use std::time::Duration;

use devtools_remote_server::{
    AnalyticsSink, NoopAnalytics, RecordingAnalytics, RelayServer, ServerConfig, ServerHandle,
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

struct TestRelay {
    handle: ServerHandle,
    _static_dir: tempfile::TempDir,
}

impl TestRelay {
    fn http(&self, path: &str) -> String {
        format!("http://{}{path}", self.handle.addr())
    }

    fn ws(&self, path: &str) -> String {
        format!("ws://{}{path}", self.handle.addr())
    }
}

/// Boot a relay on an auto-assigned port.
async fn boot(analytics: Arc<dyn AnalyticsSink>) -> TestRelay {
    let static_dir = tempfile::tempdir().unwrap();
    std::fs::write(static_dir.path().join("index.html"), "<h1>relay</h1>").unwrap();
    let config = ServerConfig {
        static_dir: static_dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let handle = RelayServer::listen(config, analytics, None).await.unwrap();
    TestRelay {
        handle,
        _static_dir: static_dir,
    }
}

async fn boot_default() -> TestRelay {
    boot(Arc::new(NoopAnalytics)).await
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn send_json(ws: &mut WsStream, value: &Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Read the next text message verbatim.
async fn read_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}

async fn read_json(ws: &mut WsStream) -> Value {
    serde_json::from_str(&read_text(ws).await).unwrap()
}

/// Try to read a text message within `dur`. Returns None on timeout or close.
async fn try_read_text(ws: &mut WsStream, dur: Duration) -> Option<String> {
    timeout(dur, async {
        while let Some(Ok(msg)) = ws.next().await {
            match msg {
                Message::Text(text) => return Some(text.as_str().to_owned()),
                Message::Close(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Read until a close frame arrives and return its code and reason.
async fn read_close(ws: &mut WsStream) -> Option<(u16, String)> {
    timeout(TIMEOUT, async {
        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Close(frame)) => {
                    return frame.map(|f| (u16::from(f.code), f.reason.as_str().to_owned()));
                }
                Ok(_) => {}
                Err(_) => return None,
            }
        }
        None
    })
    .await
    .expect("timeout waiting for close")
}

/// Connect a control channel, announce one target and return the session id.
async fn announce(relay: &TestRelay, title: &str) -> (WsStream, String) {
    let mut control = connect(&relay.ws("/control")).await;
    send_json(
        &mut control,
        &json!({"type": "hello", "data": {"title": title, "url": "http://example.com"}}),
    )
    .await;
    let created = read_json(&mut control).await;
    assert_eq!(created["type"], "sessionCreated");
    let session_id = created["data"].as_str().unwrap().to_owned();
    (control, session_id)
}

async fn get_json(url: &str) -> Value {
    reqwest::get(url).await.unwrap().json().await.unwrap()
}

/// Poll `/_stats` until `pred` holds.
async fn wait_for_stats(relay: &TestRelay, pred: impl Fn(&Value) -> bool) -> Value {
    let url = relay.http("/_stats");
    timeout(TIMEOUT, async {
        loop {
            let stats = get_json(&url).await;
            if pred(&stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("stats never reached expected state")
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP surface
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_root_greets() {
    let relay = boot_default().await;
    let body = get_json(&relay.http("/")).await;
    assert_eq!(body["msg"], "Hello from DevToolsRemote");
    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_health() {
    let relay = boot_default().await;
    let body = get_json(&relay.http("/health")).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 0);
    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_static_files_served() {
    let relay = boot_default().await;
    let resp = reqwest::get(relay.http("/index.html")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "<h1>relay</h1>");

    let missing = reqwest::get(relay.http("/missing.js")).await.unwrap();
    assert_eq!(missing.status(), 404);
    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_listing_unknown_session_is_empty() {
    let relay = boot_default().await;
    let body = get_json(&relay.http("/does-not-exist/json")).await;
    assert_eq!(body, json!([]));
    relay.handle.stop(None).await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Session lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_hello_creates_session_and_listing() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab1").await;

    let listing = get_json(&relay.http(&format!("/{sid}/json"))).await;
    let targets = listing.as_array().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0]["title"], "Tab1");
    assert_eq!(targets[0]["url"], "http://example.com");
    assert_eq!(targets[0]["type"], "page");
    assert_ne!(targets[0]["id"], sid.as_str());
    assert_eq!(
        targets[0]["webSocketDebuggerUrl"],
        format!("ws://localhost:{}/devtools/page/{sid}", relay.handle.port())
    );

    // A second hello adds a target to the same session.
    send_json(
        &mut control,
        &json!({"type": "hello", "data": {"title": "Tab2", "url": "http://example.org"}}),
    )
    .await;
    let again = read_json(&mut control).await;
    assert_eq!(again["data"], sid.as_str());
    let listing = get_json(&relay.http(&format!("/{sid}/json"))).await;
    assert_eq!(listing.as_array().unwrap().len(), 2);
    assert_eq!(listing[1]["title"], "Tab2");

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_frames_relay_verbatim_both_ways() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab").await;
    let mut data = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;

    // Whitespace and key order survive the trip.
    let request = r#"{"id":1, "method":"Runtime.evaluate","params":{"expression":"1+1"}}"#;
    data.send(Message::text(request)).await.unwrap();
    let forwarded = read_json(&mut control).await;
    assert_eq!(forwarded["type"], "data.request");
    assert_eq!(forwarded["data"]["method"], "Runtime.evaluate");
    assert_eq!(forwarded["data"]["params"]["expression"], "1+1");

    let response = r#"{"id":1,"result":{"result":{"type":"number","value":2}}}"#;
    control
        .send(Message::text(format!(r#"{{"type":"data.response","data":{response}}}"#)))
        .await
        .unwrap();
    assert_eq!(read_text(&mut data).await, response);

    let event = r#"{"method":"Page.loadEventFired","params":{"timestamp":1.5}}"#;
    control
        .send(Message::text(format!(r#"{{"type":"data.event","data":{event}}}"#)))
        .await
        .unwrap();
    assert_eq!(read_text(&mut data).await, event);

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_unknown_session_closed_with_1011() {
    let relay = boot_default().await;
    let mut data = connect(&relay.ws("/devtools/page/no-such-session")).await;
    let (code, reason) = read_close(&mut data).await.unwrap();
    assert_eq!(code, 1011);
    assert_eq!(reason, "no matching session");
    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_bad_data_path_is_not_upgraded() {
    let relay = boot_default().await;
    assert!(connect_async(relay.ws("/devtools/page/a/b")).await.is_err());
    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_control_disconnect_ends_session() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab").await;
    let mut data = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;

    control.close(None).await.unwrap();

    let (code, _) = read_close(&mut data).await.unwrap();
    assert_eq!(code, 1001);
    let _ = wait_for_stats(&relay, |s| s["count"]["sessions"] == 0).await;
    let listing = get_json(&relay.http(&format!("/{sid}/json"))).await;
    assert_eq!(listing, json!([]));

    // The session id is gone for good.
    let mut late = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let (code, _) = read_close(&mut late).await.unwrap();
    assert_eq!(code, 1011);

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_data_disconnect_keeps_session() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab").await;
    let mut data = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;

    data.close(None).await.unwrap();
    let stats = wait_for_stats(&relay, |s| s["count"]["bindings"] == 0).await;
    assert_eq!(stats["count"]["sessions"], 1);

    // Frames with no peer are dropped and the control channel stays up.
    send_json(&mut control, &json!({"type": "data.event", "data": {"method": "X"}})).await;

    let mut again = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;
    send_json(&mut control, &json!({"type": "data.event", "data": {"method": "Y"}})).await;
    assert_eq!(read_text(&mut again).await, r#"{"method":"Y"}"#);

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_second_data_channel_replaces_first() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab").await;
    let path = format!("/devtools/page/{sid}");

    let mut first = connect(&relay.ws(&path)).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;
    let mut second = connect(&relay.ws(&path)).await;

    let (code, _) = read_close(&mut first).await.unwrap();
    assert_eq!(code, 4001);

    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;
    send_json(&mut control, &json!({"type": "data.response", "data": {"id": 7}})).await;
    assert_eq!(read_text(&mut second).await, r#"{"id":7}"#);

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_malformed_frames_are_dropped() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab").await;
    let mut data = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;

    data.send(Message::text("not json {")).await.unwrap();
    control.send(Message::text("{\"type\":")).await.unwrap();
    control
        .send(Message::text(r#"{"type":"data.response"}"#))
        .await
        .unwrap();
    assert!(try_read_text(&mut control, Duration::from_millis(200)).await.is_none());

    // Both channels keep working afterwards.
    data.send(Message::text(r#"{"id":2}"#)).await.unwrap();
    let forwarded = read_json(&mut control).await;
    assert_eq!(forwarded["data"]["id"], 2);
    send_json(&mut control, &json!({"type": "data.response", "data": {"id": 2}})).await;
    assert_eq!(read_text(&mut data).await, r#"{"id":2}"#);

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_sessions_are_isolated() {
    let relay = boot_default().await;
    let (mut control_a, a) = announce(&relay, "A").await;
    let (mut control_b, b) = announce(&relay, "B").await;
    assert_ne!(a, b);

    let mut data_a = connect(&relay.ws(&format!("/devtools/page/{a}"))).await;
    let mut data_b = connect(&relay.ws(&format!("/devtools/page/{b}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 2).await;

    data_a.send(Message::text(r#"{"from":"a"}"#)).await.unwrap();
    let got = read_json(&mut control_a).await;
    assert_eq!(got["data"]["from"], "a");
    assert!(try_read_text(&mut control_b, Duration::from_millis(150)).await.is_none());

    send_json(&mut control_b, &json!({"type": "data.event", "data": {"to": "b"}})).await;
    assert_eq!(read_text(&mut data_b).await, r#"{"to":"b"}"#);
    assert!(try_read_text(&mut data_a, Duration::from_millis(150)).await.is_none());

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_stats_track_live_counts() {
    let relay = boot_default().await;
    let (_control, sid) = announce(&relay, "Tab").await;
    let _data = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;

    let stats = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;
    assert_eq!(
        stats,
        json!({"count": {"sessions": 1, "sockets": 1, "targets": 1, "bindings": 1}})
    );
    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_analytics_lifecycle_events() {
    let recorder = Arc::new(RecordingAnalytics::new());
    let relay = boot(Arc::clone(&recorder) as Arc<dyn AnalyticsSink>).await;
    let (mut control, sid) = announce(&relay, "Tab").await;

    control.close(None).await.unwrap();
    let events = timeout(TIMEOUT, async {
        loop {
            let events = recorder.events();
            if events.len() >= 3 {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session end never recorded");

    let names: Vec<&str> = events.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["sessions_created", "session_ended", "sessions_duration"]);
    assert_eq!(events[0].1["sessionId"], sid.as_str());
    let ended = &events[1].1;
    assert!(ended["duration"].as_i64().unwrap() >= 0);
    assert_eq!(
        ended["endTime"].as_i64().unwrap() - ended["startTime"].as_i64().unwrap(),
        ended["duration"].as_i64().unwrap()
    );

    relay.handle.stop(None).await.unwrap();
}

#[tokio::test]
async fn e2e_graceful_shutdown_closes_channels() {
    let relay = boot_default().await;
    let (mut control, sid) = announce(&relay, "Tab").await;
    let mut data = connect(&relay.ws(&format!("/devtools/page/{sid}"))).await;
    let _ = wait_for_stats(&relay, |s| s["count"]["bindings"] == 1).await;

    let shutdown = Arc::clone(relay.handle.shutdown_coordinator());
    let stop = tokio::spawn(relay.handle.stop(Some(Duration::from_secs(3))));

    let (code, _) = read_close(&mut control).await.unwrap();
    assert_eq!(code, 1001);
    assert!(read_close(&mut data).await.is_some());
    stop.await.unwrap().unwrap();
    assert_eq!(shutdown.active_connections(), 0);
}
