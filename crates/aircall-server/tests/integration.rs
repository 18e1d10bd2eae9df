//! End-to-end tests driving the signaling server with real WebSocket clients.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aircall_server::config::ServerConfig;
use aircall_server::server::AirCallServer;
use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

const TIMEOUT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Boot a test server and return the WS URL, its address and the server.
async fn boot_server_with(config: ServerConfig) -> (String, SocketAddr, Arc<AirCallServer>) {
    let server = Arc::new(AirCallServer::new(config));
    let (addr, _handle) = server.listen().await.unwrap();
    let url = format!("ws://{addr}{}", server.config().path);
    (url, addr, server)
}

async fn boot_server() -> (String, Arc<AirCallServer>) {
    let (url, _, server) = boot_server_with(ServerConfig::default()).await;
    (url, server)
}

/// A connected client that keeps events which arrive while it waits for a response.
struct Client {
    ws: WsStream,
    client_id: String,
    pending: VecDeque<Value>,
    next_id: u64,
}

impl Client {
    /// Connect and consume the `connection.established` greeting.
    async fn connect(url: &str) -> Self {
        let (mut ws, _) = connect_async(url).await.unwrap();
        let hello = read_json(&mut ws).await;
        assert_eq!(hello["type"], "connection.established");
        let client_id = hello["data"]["clientId"].as_str().unwrap().to_owned();
        Self {
            ws,
            client_id,
            pending: VecDeque::new(),
            next_id: 0,
        }
    }

    /// Send a request and read until its response arrives.
    async fn call(&mut self, method: &str, params: Option<Value>) -> Value {
        self.next_id += 1;
        let id = format!("r{}", self.next_id);
        let mut req = json!({"id": id, "method": method});
        if let Some(p) = params {
            req["params"] = p;
        }
        self.ws.send(Message::text(req.to_string())).await.unwrap();

        loop {
            let msg = read_json(&mut self.ws).await;
            if msg.get("id").and_then(Value::as_str) == Some(id.as_str()) {
                return msg;
            }
            self.pending.push_back(msg);
        }
    }

    async fn join(&mut self, room: &str, user: &str) -> Value {
        self.call("room.join", Some(json!({"roomId": room, "userName": user})))
            .await
    }

    async fn send_text(&mut self, message: &str) -> Value {
        self.call("room.sendTextMessage", Some(json!({"message": message})))
            .await
    }

    /// Next pushed event (one carrying a `type`).
    async fn event(&mut self) -> Value {
        if let Some(ev) = self.pending.pop_front() {
            return ev;
        }
        read_json(&mut self.ws).await
    }

    /// Assert nothing else arrives for a short while.
    async fn assert_quiet(&mut self) {
        assert!(self.pending.is_empty(), "unexpected: {:?}", self.pending);
        if let Ok(Some(Ok(Message::Text(text)))) = timeout(QUIET, self.ws.next()).await {
            panic!("unexpected message: {text}");
        }
    }
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn assert_event(ev: &Value, kind: &str, data: Value) {
    assert_eq!(ev["type"], kind, "event: {ev}");
    assert_eq!(ev["data"], data, "event: {ev}");
    assert!(ev["timestamp"].is_string());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_connection_established_on_connect() {
    let (url, server) = boot_server().await;
    let a = Client::connect(&url).await;
    let b = Client::connect(&url).await;
    assert!(!a.client_id.is_empty());
    assert_ne!(a.client_id, b.client_id);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_join_notifies_joiner_and_members() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;
    let mut bob = Client::connect(&url).await;

    let resp = alice.join("R1", "alice").await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["result"], json!({"roomId": "R1", "userName": "alice", "members": 1}));
    assert_event(&alice.event().await, "room.userJoined", json!({"user": "alice"}));

    let resp = bob.join("R1", "bob").await;
    assert_eq!(resp["result"]["members"], 2);
    assert_event(&bob.event().await, "room.userJoined", json!({"user": "bob"}));
    assert_event(&alice.event().await, "room.userJoined", json!({"user": "bob"}));

    alice.assert_quiet().await;
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_message_fans_out_within_room_only() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;
    let mut bob = Client::connect(&url).await;
    let mut carol = Client::connect(&url).await;

    let _ = alice.join("R1", "alice").await;
    let _ = bob.join("R1", "bob").await;
    let _ = carol.join("R2", "carol").await;
    let _ = alice.event().await; // alice joined
    let _ = alice.event().await; // bob joined
    let _ = bob.event().await; // bob joined
    let _ = carol.event().await; // carol joined

    let resp = bob.send_text("hello").await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["result"], json!({"roomId": "R1", "recipients": 2}));

    let expected = json!({"sender": "bob", "message": "hello"});
    assert_event(&alice.event().await, "room.textMessage", expected.clone());
    assert_event(&bob.event().await, "room.textMessage", expected);
    carol.assert_quiet().await;

    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_duplicate_join_is_rejected() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;
    let _ = alice.join("R1", "alice").await;
    let _ = alice.event().await;

    let resp = alice.join("R2", "alice").await;
    assert_eq!(resp["success"], false);
    assert_eq!(resp["error"]["code"], "ALREADY_JOINED");
    assert_eq!(resp["error"]["message"], "You have already joined the room R1");
    assert_eq!(resp["error"]["details"]["roomId"], "R1");
    alice.assert_quiet().await;

    assert_eq!(server.hub().registry().room_count(), 1);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_leave_notifies_remaining_members() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;
    let mut bob = Client::connect(&url).await;
    let _ = alice.join("R1", "alice").await;
    let _ = bob.join("R1", "bob").await;
    let _ = alice.event().await;
    let _ = alice.event().await;
    let _ = bob.event().await;

    let resp = bob.call("room.leave", None).await;
    assert_eq!(resp["success"], true);
    assert_eq!(resp["result"], json!({"roomId": "R1", "remaining": 1}));
    assert_event(&alice.event().await, "room.userLeft", json!({"user": "bob"}));
    bob.assert_quiet().await;

    let resp = bob.send_text("anyone?").await;
    assert_eq!(resp["error"]["code"], "NOT_JOINED");
    assert_eq!(resp["error"]["message"], "You aren't connected to any room");

    let resp = bob.call("room.leave", None).await;
    assert_eq!(resp["error"]["code"], "NOT_JOINED");

    // Rejoining after a leave is allowed.
    let resp = bob.join("R2", "bob").await;
    assert_eq!(resp["success"], true);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_disconnect_leaves_room() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;
    let mut bob = Client::connect(&url).await;
    let _ = alice.join("R1", "alice").await;
    let _ = bob.join("R1", "bob").await;
    let _ = alice.event().await;
    let _ = alice.event().await;

    bob.ws.close(None).await.unwrap();
    drop(bob);

    assert_event(&alice.event().await, "room.userLeft", json!({"user": "bob"}));
    let registry = server.hub().registry();
    assert_eq!(registry.connection_count(), 1);
    assert_eq!(registry.room_count(), 1);

    // Last member disconnecting removes the room.
    alice.ws.close(None).await.unwrap();
    drop(alice);
    timeout(TIMEOUT, async {
        while server.hub().registry().room_count() > 0 || server.broadcast().connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_invalid_requests() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;

    alice.ws.send(Message::text("not json")).await.unwrap();
    let resp = read_json(&mut alice.ws).await;
    assert_eq!(resp["id"], "unknown");
    assert_eq!(resp["error"]["code"], "INVALID_PARAMS");

    let resp = alice.call("room.join", Some(json!({"roomId": "R1"}))).await;
    assert_eq!(resp["error"]["code"], "INVALID_PARAMS");

    let resp = alice.call("room.dance", None).await;
    assert_eq!(resp["error"]["code"], "METHOD_NOT_FOUND");

    assert!(!server.hub().registry().is_joined(&alice.client_id.as_str().into()));
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_health_reports_rooms() {
    let (url, addr, server) = boot_server_with(ServerConfig::default()).await;
    let mut alice = Client::connect(&url).await;
    let _ = alice.join("R1", "alice").await;

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(
        &mut stream,
        b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await
    .unwrap();
    let mut raw = String::new();
    let _ = tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut raw)
        .await
        .unwrap();
    let body = raw.split("\r\n\r\n").nth(1).unwrap();
    let v: Value = serde_json::from_str(body).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["connections"], 1);
    assert_eq!(v["rooms"], 1);
    assert_eq!(v["joined"], 1);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_connection_limit_returns_503() {
    let config = ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    };
    let (url, _, server) = boot_server_with(config).await;
    let _first = Client::connect(&url).await;

    let err = connect_async(url.as_str()).await.unwrap_err();
    assert_matches!(err, WsError::Http(ref resp) if resp.status() == 503);
    server.shutdown().shutdown();
}

#[tokio::test]
async fn e2e_shutdown_waits_for_sessions_to_leave_rooms() {
    let (url, server) = boot_server().await;
    let mut alice = Client::connect(&url).await;
    let _ = alice.join("R1", "alice").await;
    let _ = alice.event().await;
    let mut bob = Client::connect(&url).await;
    let _ = bob.join("R2", "bob").await;
    let _ = bob.event().await;
    assert_eq!(server.shutdown().active_sessions(), 2);

    timeout(
        TIMEOUT,
        server
            .shutdown()
            .graceful_shutdown(Vec::new(), Some(Duration::from_secs(5))),
    )
    .await
    .unwrap();

    // Every session has left its room by the time shutdown returns.
    assert_eq!(server.shutdown().active_sessions(), 0);
    assert_eq!(server.hub().registry().connection_count(), 0);
    assert_eq!(server.hub().registry().room_count(), 0);
    assert_eq!(server.broadcast().connection_count(), 0);

    let closed = timeout(TIMEOUT, async {
        loop {
            match alice.ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
