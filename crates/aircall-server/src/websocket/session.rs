//! WebSocket session lifecycle: handles a single connected client from
//! upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use aircall_core::{CallHub, ConnectionId};
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::broadcast::BroadcastManager;
use super::connection::ClientConnection;
use super::handler::handle_message;
use crate::config::ServerConfig;
use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::RpcEvent;

/// How long the outbound task gets to flush after the session ends.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-session timing and buffering.
#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// How long to wait for a Pong before considering the client dead.
    pub pong_timeout: Duration,
    /// Outbound messages buffered before drops begin.
    pub send_queue_capacity: usize,
}

impl From<&ServerConfig> for SessionOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_timeout: config.pong_timeout(),
            send_queue_capacity: config.send_queue_capacity,
        }
    }
}

/// The `connection.established` greeting carrying the client's id.
pub fn established_event(connection_id: &ConnectionId) -> RpcEvent {
    RpcEvent::new(
        "connection.established",
        Some(serde_json::json!({ "clientId": connection_id })),
    )
}

/// Run a WebSocket session for a connected client.
///
/// 1. Registers the connection and sends `connection.established`
/// 2. Dispatches incoming text frames as RPC requests
/// 3. Forwards outbound events/responses via the send channel
/// 4. Sends periodic Ping frames and disconnects unresponsive clients
/// 5. On any exit (close frame, socket error, slow client, internal error,
///    server shutdown) leaves the room if joined, then deregisters
#[instrument(skip_all, fields(connection = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    registry: Arc<MethodRegistry>,
    hub: CallHub,
    broadcast: Arc<BroadcastManager>,
    options: SessionOptions,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(options.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(connection_id.clone(), send_tx));
    let ctx = RpcContext::new(hub.clone(), connection_id.clone());

    info!("client connected");
    counter!("ws_connections_total").increment(1);
    gauge!("ws_connections_active").increment(1.0);

    broadcast.add(connection.clone()).await;

    if let Ok(json) = serde_json::to_string(&established_event(&connection_id)) {
        let _ = ws_tx.send(Message::Text(json.into())).await;
    }

    // Outbound forwarder with periodic Ping frames.
    let outbound_conn = connection.clone();
    let outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(options.ping_interval);
        // Skip the immediate first tick
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > options.pong_timeout
                    {
                        warn!("client unresponsive for {:?}, disconnecting", options.pong_timeout);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_conn.closed() => {
                    while let Ok(text) = send_rx.try_recv() {
                        if ws_tx.send(Message::Text(String::clone(&text).into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        outbound_conn.close();
    });

    loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            () = connection.closed() => break,
            () = shutdown.cancelled() => {
                info!("server shutting down, closing session");
                break;
            }
        };
        let msg = match next {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read failed");
                break;
            }
            None => break,
        };
        connection.mark_alive();

        let text = match msg {
            Message::Text(ref t) => t.to_string(),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    s.to_owned()
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let result = handle_message(&text, &registry, &ctx).await;
        if !connection.send(Arc::new(result.response_json.clone())) {
            info!("failed to enqueue response (channel full or closed)");
        }
        if result.is_fatal() {
            error!(method = %result.method, "internal error, dropping connection");
            break;
        }
    }

    // Clean up: leave first so the group removal and the departure notice
    // happen while the connection is still registered.
    connection.close();
    match hub.leave_if_joined(&connection_id).await {
        Ok(Some(left)) => info!(room = %left.room, user = %left.user, "left room on disconnect"),
        Ok(None) => {}
        Err(e) if e.is_defect() => error!(error = %e, "leave on disconnect hit a registry fault"),
        Err(e) => warn!(error = %e, "leave on disconnect failed"),
    }
    broadcast.remove(&connection_id).await;

    let abort = outbound.abort_handle();
    if tokio::time::timeout(FLUSH_TIMEOUT, outbound).await.is_err() {
        abort.abort();
    }

    info!(age_secs = connection.age().as_secs(), "client disconnected");
    counter!("ws_disconnections_total").increment(1);
    gauge!("ws_connections_active").decrement(1.0);
    histogram!("ws_connection_duration_seconds").record(connection.age().as_secs_f64());
}
