//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use devtools_remote_core::{Relay, SessionId, SessionRegistry, Target, parse_data_channel_path};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::analytics::AnalyticsSink;
use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, GREETING, HealthResponse, StatsResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::Keepalive;
use crate::websocket::control::run_control_session;
use crate::websocket::data::run_data_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry plus frame forwarding.
    pub relay: Relay,
    /// Analytics observer.
    pub analytics: Arc<dyn AnalyticsSink>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Ping cadence for every connection.
    pub keepalive: Keepalive,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when metrics are enabled.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    state: AppState,
}

impl RelayServer {
    /// Create a server whose target URLs use `config.public_host`, or
    /// `localhost:{config.port}` when none is set.
    pub fn new(config: ServerConfig, analytics: Arc<dyn AnalyticsSink>) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.addressing()));
        let keepalive = Keepalive::from_config(&config);
        Self {
            state: AppState {
                relay: Relay::new(registry),
                analytics,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                config: Arc::new(config),
                keepalive,
                start_time: Instant::now(),
                metrics: None,
            },
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.state.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let static_files = ServeDir::new(&self.state.config.static_dir);
        Router::new()
            .route("/", get(index_handler))
            .route("/health", get(health_handler))
            .route("/_stats", get(stats_handler))
            .route("/metrics", get(metrics_handler))
            .route("/control", get(control_handler))
            .route("/devtools/page/{*rest}", get(data_handler))
            .route("/{session_id}/json", get(list_targets_handler))
            .fallback_service(static_files)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Get the relay.
    pub fn relay(&self) -> &Relay {
        &self.state.relay
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Bind `config.host:config.port` and serve until shut down.
    ///
    /// With port `0` the assigned port is used for the `localhost` fallback
    /// in target URLs.
    pub async fn listen(
        mut config: ServerConfig,
        analytics: Arc<dyn AnalyticsSink>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<ServerHandle, ServerError> {
        let bind_addr = config.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind_addr,
                source,
            })?;
        let addr = listener.local_addr()?;
        config.port = addr.port();

        let mut server = Self::new(config, analytics);
        if let Some(handle) = metrics {
            server = server.with_metrics(handle);
        }
        let router = server.router();
        let token = server.shutdown().token();

        info!(
            %addr,
            public_host = server.relay().registry().addressing().public_host(),
            static_dir = %server.config().static_dir.display(),
            "relay server listening"
        );

        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await
        });

        Ok(ServerHandle {
            addr,
            relay: server.relay().clone(),
            shutdown: Arc::clone(server.shutdown()),
            task,
        })
    }
}

/// Handle returned by [`RelayServer::listen`].
pub struct ServerHandle {
    addr: SocketAddr,
    relay: Relay,
    shutdown: Arc<ShutdownCoordinator>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// The running server's relay.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Shutdown coordinator shared with every connection.
    pub fn shutdown_coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Stop accepting, close every connection and wait for the listener.
    pub async fn stop(self, timeout: Option<Duration>) -> Result<(), ServerError> {
        let _ = self.shutdown.drain(timeout).await;
        match self.task.await {
            Ok(result) => result.map_err(ServerError::from),
            Err(e) => Err(ServerError::Io(std::io::Error::other(e))),
        }
    }
}

/// GET /
async fn index_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "msg": GREETING }))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.shutdown.active_connections(),
        state.relay.registry().stats(),
        state.shutdown.is_shutting_down(),
    ))
}

/// GET /_stats
async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        count: state.relay.registry().stats(),
    })
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /{session_id}/json
async fn list_targets_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<Vec<Target>> {
    let targets = state
        .relay
        .registry()
        .list_targets(&SessionId::from_raw(session_id));
    debug!(count = targets.len(), "listing targets");
    Json(targets)
}

/// GET /control (WebSocket upgrade)
async fn control_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| run_control_session(socket, state))
}

/// GET /devtools/page/{sessionId} (WebSocket upgrade)
///
/// Paths that do not carry exactly one session segment are 404 before any
/// upgrade. An unknown session is accepted and then closed with 1011.
async fn data_handler(
    State(state): State<AppState>,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(session_id) = parse_data_channel_path(uri.path()) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match ws {
        Ok(ws) => ws
            .max_message_size(state.config.max_message_size)
            .on_upgrade(move |socket| run_data_session(socket, session_id, state)),
        Err(rejection) => rejection.into_response(),
    }
}
