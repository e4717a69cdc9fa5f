//! `RelayServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures::StreamExt;
use mediasync_core::{Broadcaster, ConnectionId, RoomId, RoomStats};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::hub::RoomHub;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::ClientConnection;
use crate::websocket::router::MessageRouter;
use crate::websocket::session::{SessionContext, run_ws_session};

/// How often `drain` re-checks the registry.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Room registry.
    pub hub: Arc<RoomHub>,
    /// Inbound message dispatcher.
    pub router: Arc<MessageRouter>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics_handle: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    hub: Arc<RoomHub>,
    router: Arc<MessageRouter>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics_handle: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a new server.
    pub fn new(config: ServerConfig) -> Self {
        let hub = Arc::new(RoomHub::new());
        let router = Arc::new(MessageRouter::new(hub.clone()));
        Self {
            config: Arc::new(config),
            hub,
            router,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics_handle: None,
        }
    }

    /// Expose `/metrics` using `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            router: self.router.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        };

        let mut app = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/stats", get(stats_handler));
        if self.metrics_handle.is_some() {
            app = app.route("/metrics", get(metrics_handler));
        }
        app.layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind the listener and start serving in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// The task finishes once shutdown is signalled and in-flight HTTP
    /// requests complete.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(addr = %local, "relay listening");

        let app = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            if let Err(e) = serve(listener, app, token).await {
                error!(error = %e, "relay server stopped");
            }
        });
        Ok((local, handle))
    }

    /// Wait until every session has left the registry, up to `timeout`.
    ///
    /// Returns `true` if the registry emptied in time.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.hub.stats().clients > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Get the room registry.
    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Run the accept loop until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(ServerError::Serve)?;
    info!("relay server stopped accepting connections");
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    room: Option<String>,
}

/// GET /ws?room=<id>
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let room = RoomId::resolve(query.room.as_deref(), &state.config.default_room);
    let id = ConnectionId::generate();
    let limit = state.config.timing.max_message_size;

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let (conn, outbound) =
                ClientConnection::new(id, room, state.config.send_queue_capacity);
            let (sink, stream) = socket.split();
            let ctx = SessionContext {
                hub: state.hub.clone(),
                router: state.router.clone(),
                timing: state.config.timing,
                shutdown: state.shutdown.token(),
            };
            let _ = run_ws_session(sink, stream, Arc::new(conn), outbound, ctx).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.hub.stats()))
}

/// GET /stats
async fn stats_handler(State(state): State<AppState>) -> Json<RoomStats> {
    Json(state.hub.stats())
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
