//! WebSocket connection state plus the reader/writer halves shared by both
//! channel kinds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use devtools_remote_core::{CloseReason, ConnectionId, FrameSink};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_PING_TIMEOUTS_TOTAL, WS_SEND_QUEUE_DROPS_TOTAL,
};
use crate::shutdown::ConnectionGuard;

/// How long to wait for the writer to flush the close frame.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Which side of a session a connection serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelKind {
    /// Instrumented client announcing targets.
    Control,
    /// Debugger frontend speaking the wire protocol.
    Data,
}

impl ChannelKind {
    /// Metric/log label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Data => "data",
        }
    }
}

/// Ping cadence and liveness deadline.
#[derive(Clone, Copy, Debug)]
pub struct Keepalive {
    /// Interval between server-initiated Ping frames.
    pub interval: Duration,
    /// Close after this long without a pong or any inbound frame.
    pub timeout: Duration,
}

impl Keepalive {
    /// Keepalive settings from server config.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            interval: config.ping_interval(),
            timeout: config.pong_timeout(),
        }
    }
}

/// One connected WebSocket, exposed to the relay as a [`FrameSink`].
pub struct ChannelConnection {
    id: ConnectionId,
    kind: ChannelKind,
    /// Send channel to the connection's write task.
    tx: mpsc::Sender<Arc<str>>,
    /// When this connection was established.
    connected_at: Instant,
    /// Whether the peer has shown activity since the last ping tick.
    is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) arrived.
    last_pong: Mutex<Instant>,
    /// Frames dropped because the queue was full or closed.
    dropped_messages: AtomicU64,
    close_reason: Mutex<Option<CloseReason>>,
    closed: CancellationToken,
}

impl ChannelConnection {
    /// Create a new connection feeding `tx`.
    pub fn new(kind: ChannelKind, tx: mpsc::Sender<Arc<str>>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            kind,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            close_reason: Mutex::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Connection id.
    pub fn connection_id(&self) -> &ConnectionId {
        &self.id
    }

    /// Channel kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Mark the connection as alive (pong or frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Reason passed to the first [`FrameSink::close`] call.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Whether a close has been requested.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once a close has been requested.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

impl FrameSink for ChannelConnection {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn send(&self, frame: Arc<str>) -> bool {
        if !self.is_closed() && self.tx.try_send(frame).is_ok() {
            return true;
        }
        let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        counter!(WS_SEND_QUEUE_DROPS_TOTAL, "channel" => self.kind.as_str()).increment(1);
        false
    }

    fn close(&self, reason: CloseReason) {
        {
            let mut slot = self.close_reason.lock();
            if slot.is_none() {
                *slot = Some(reason);
            }
        }
        self.closed.cancel();
    }
}

/// A live WebSocket: shared connection state, the inbound half, and the
/// spawned writer task.
pub(crate) struct Channel {
    conn: Arc<ChannelConnection>,
    reader: SplitStream<WebSocket>,
    writer: JoinHandle<()>,
    _guard: ConnectionGuard,
}

impl Channel {
    /// Split `ws`, spawn its writer and start counting it as live.
    pub(crate) fn open(
        ws: WebSocket,
        kind: ChannelKind,
        queue_capacity: usize,
        keepalive: Keepalive,
        guard: ConnectionGuard,
    ) -> Self {
        let (ws_tx, reader) = ws.split();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let conn = Arc::new(ChannelConnection::new(kind, tx));
        let writer = tokio::spawn(run_writer(ws_tx, rx, Arc::clone(&conn), keepalive));

        counter!(WS_CONNECTIONS_TOTAL, "channel" => kind.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE, "channel" => kind.as_str()).increment(1.0);

        Self {
            conn,
            reader,
            writer,
            _guard: guard,
        }
    }

    pub(crate) fn connection(&self) -> &Arc<ChannelConnection> {
        &self.conn
    }

    /// The connection as a type-erased sink.
    pub(crate) fn sink(&self) -> Arc<dyn FrameSink> {
        self.conn.clone()
    }

    /// Next inbound text frame, or `None` once the connection is done.
    ///
    /// Binary frames holding UTF-8 are treated as text. Returns `None` on
    /// peer close, transport error, a requested close, or server shutdown.
    pub(crate) async fn next_text(&mut self, shutdown: &CancellationToken) -> Option<String> {
        let conn_id = self.conn.id.as_str();
        loop {
            let msg = tokio::select! {
                biased;
                () = self.conn.closed() => return None,
                () = shutdown.cancelled() => {
                    self.conn.close(CloseReason::SHUTDOWN);
                    return None;
                }
                msg = self.reader.next() => msg,
            };

            match msg {
                None => {
                    debug!(conn_id, "stream ended");
                    return None;
                }
                Some(Err(e)) => {
                    warn!(conn_id, error = %e, "transport error");
                    return None;
                }
                Some(Ok(Message::Text(text))) => {
                    self.conn.mark_alive();
                    return Some(text.as_str().to_owned());
                }
                Some(Ok(Message::Binary(data))) => {
                    self.conn.mark_alive();
                    match String::from_utf8(data.to_vec()) {
                        Ok(text) => return Some(text),
                        Err(_) => debug!(conn_id, len = data.len(), "non-UTF8 binary frame"),
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(
                        conn_id,
                        code = frame.as_ref().map(|f| f.code),
                        "peer sent close frame"
                    );
                    return None;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => self.conn.mark_alive(),
            }
        }
    }

    /// Close with `reason` (unless a reason was already set) and wait for the
    /// writer to flush the close frame.
    pub(crate) async fn finish(self, reason: CloseReason) {
        let Self {
            conn,
            writer,
            reader,
            _guard,
        } = self;
        conn.close(reason);
        drop(reader);

        let abort = writer.abort_handle();
        if tokio::time::timeout(WRITER_FLUSH_TIMEOUT, writer).await.is_err() {
            abort.abort();
        }

        let kind = conn.kind.as_str();
        counter!(WS_DISCONNECTIONS_TOTAL, "channel" => kind).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE, "channel" => kind).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS, "channel" => kind)
            .record(conn.age().as_secs_f64());
        debug!(
            conn_id = conn.id.as_str(),
            dropped = conn.drop_count(),
            close_code = conn.close_reason().map(|r| r.code),
            "connection finished"
        );
    }
}

/// Forward queued frames to the socket and send periodic pings.
///
/// Ends when a close is requested (sending the close frame), when the peer
/// stops answering pings, or when the socket fails.
async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Arc<str>>,
    conn: Arc<ChannelConnection>,
    keepalive: Keepalive,
) {
    let mut ping_interval = tokio::time::interval(keepalive.interval);
    // Skip the immediate first tick
    let _ = ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = conn.closed() => break,
            msg = rx.recv() => {
                let Some(text) = msg else { break };
                if ws_tx.send(Message::Text(String::from(&*text).into())).await.is_err() {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !conn.check_alive() && conn.last_pong_elapsed() > keepalive.timeout {
                    warn!(
                        conn_id = conn.id.as_str(),
                        "peer unresponsive for {:?}, disconnecting",
                        keepalive.timeout
                    );
                    counter!(WS_PING_TIMEOUTS_TOTAL, "channel" => conn.kind.as_str()).increment(1);
                    conn.close(CloseReason::UNRESPONSIVE);
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Wakes the reader if the loop ended on a socket error.
    conn.close(CloseReason::NORMAL);
    let reason = conn.close_reason().unwrap_or(CloseReason::NORMAL);
    let frame = CloseFrame {
        code: reason.code,
        reason: reason.reason.to_string().into(),
    };
    let _ = ws_tx.send(Message::Close(Some(frame))).await;
    let _ = ws_tx.close().await;
}
