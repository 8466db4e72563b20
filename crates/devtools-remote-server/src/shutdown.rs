//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Upgraded WebSocket connections outlive the HTTP listener, so every
//! connection loop holds a [`ConnectionGuard`] and [`ShutdownCoordinator::drain`]
//! waits for the guards to drop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for draining connections.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the listener and all connections.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    active: AtomicUsize,
    idle: Notify,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            active: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Register a live connection until the guard drops.
    pub fn connection_guard(self: &Arc<Self>) -> ConnectionGuard {
        let _ = self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            coordinator: Arc::clone(self),
        }
    }

    /// Number of live connections.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Cancel the token and wait up to `timeout` for every connection to
    /// finish. Returns `false` if connections were still open at the deadline.
    pub async fn drain(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        self.shutdown();
        info!(
            connections = self.active_connections(),
            timeout_secs = timeout.as_secs(),
            "waiting for connections to close"
        );

        let wait_idle = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.active_connections() == 0 {
                    return;
                }
                notified.await;
            }
        };

        if tokio::time::timeout(timeout, wait_idle).await.is_err() {
            warn!(
                connections = self.active_connections(),
                "shutdown timed out after {timeout:?}, connections still open"
            );
            return false;
        }
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a connection counted as live.
pub struct ConnectionGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.coordinator.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.coordinator.idle.notify_waiters();
        }
    }
}
