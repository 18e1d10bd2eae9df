//! `AirCallServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use aircall_core::{CallHub, ConnectionId, SessionRegistry};
use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::rpc::handlers::register_all;
use crate::rpc::registry::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::broadcast::BroadcastManager;
use crate::websocket::session::{SessionOptions, run_ws_session};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// RPC method registry.
    pub registry: Arc<MethodRegistry>,
    /// Room operations.
    pub hub: CallHub,
    /// Live connections and room groups.
    pub broadcast: Arc<BroadcastManager>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
}

/// The AirCall signaling server.
pub struct AirCallServer {
    config: Arc<ServerConfig>,
    registry: Arc<MethodRegistry>,
    hub: CallHub,
    broadcast: Arc<BroadcastManager>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl AirCallServer {
    /// Create a server with the room methods registered.
    pub fn new(config: ServerConfig) -> Self {
        let mut registry = MethodRegistry::new();
        register_all(&mut registry);

        let broadcast = Arc::new(BroadcastManager::new());
        let hub = CallHub::new(Arc::new(SessionRegistry::new()), broadcast.clone());
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            hub,
            broadcast,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
            hub: self.hub.clone(),
            broadcast: self.broadcast.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        };

        Router::new()
            .route("/health", get(health_handler))
            .route(&self.config.path, get(ws_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind the configured address and serve until shutdown is requested.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), std::io::Error> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });

        info!(%addr, path = %self.config.path, "AirCall server listening");
        Ok((addr, handle))
    }

    /// Get the broadcast manager.
    pub fn broadcast(&self) -> &Arc<BroadcastManager> {
        &self.broadcast
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the method registry.
    pub fn registry(&self) -> &Arc<MethodRegistry> {
        &self.registry
    }

    /// Get the room hub.
    pub fn hub(&self) -> &CallHub {
        &self.hub
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let rooms = state.hub.registry();
    Json(health::health_check(
        state.start_time,
        state.broadcast.connection_count(),
        rooms.room_count(),
        rooms.connection_count(),
    ))
}

/// GET {path}: upgrade to a signaling session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server shutting down").into_response();
    }
    let active = state.broadcast.connection_count();
    if active >= state.config.max_connections {
        warn!(active, max = state.config.max_connections, "connection limit reached");
        counter!("ws_connections_rejected_total").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let connection_id = ConnectionId::new();
    let options = SessionOptions::from(state.config.as_ref());
    let token = state.shutdown.token();
    let shutdown = state.shutdown.clone();
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| {
            shutdown.track_session(run_ws_session(
                socket,
                connection_id,
                state.registry,
                state.hub,
                state.broadcast,
                options,
                token,
            ))
        })
        .into_response()
}
