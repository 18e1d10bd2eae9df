//! Room event fan-out to connected WebSocket clients.
//!
//! [`BroadcastManager`] is the server's [`BroadcastTransport`]: it tracks the
//! live connections and, per room, the group of connections that receive
//! that room's events. The two maps are never locked at the same time.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use aircall_core::{BroadcastTransport, ConnectionId, RoomEvent, RoomId, TransportError};
use async_trait::async_trait;
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::rpc::types::RpcEvent;

/// Maximum total lifetime message drops before forcibly disconnecting a slow client.
const MAX_TOTAL_DROPS: u64 = 100;

/// Live connections plus room groups.
pub struct BroadcastManager {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<ConnectionId, Arc<ClientConnection>>>,
    /// Group members indexed by room.
    groups: RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
    /// Atomic counter tracking total connections (avoids read-locking for count queries).
    active_count: AtomicUsize,
}

impl BroadcastManager {
    /// Create a new broadcast manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
        }
    }

    /// Add a connection.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut conns = self.connections.write().await;
        if conns.insert(connection.id.clone(), connection).is_none() {
            let _ = self.active_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a connection and any group membership it still holds.
    pub async fn remove(&self, connection_id: &ConnectionId) {
        {
            let mut conns = self.connections.write().await;
            if conns.remove(connection_id).is_some() {
                let _ = self.active_count.fetch_sub(1, Ordering::Relaxed);
            }
        }
        let mut groups = self.groups.write().await;
        groups.retain(|_, members| {
            let _ = members.remove(connection_id);
            !members.is_empty()
        });
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Current members of the group for `room` (sorted).
    pub async fn group_members(&self, room: &RoomId) -> Vec<ConnectionId> {
        let mut members: Vec<ConnectionId> = self
            .groups
            .read()
            .await
            .get(room)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Number of non-empty groups.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    /// Serialize once, deliver to every live member, close slow clients.
    async fn fan_out(&self, room: &RoomId, event: &RpcEvent) -> Result<(), TransportError> {
        let json = serde_json::to_string(event)
            .map(Arc::new)
            .map_err(|e| TransportError::new("send_to_group", e.to_string()))?;

        let members: Vec<ConnectionId> = self
            .groups
            .read()
            .await
            .get(room)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default();

        let conns = self.connections.read().await;
        let mut recipients = 0u32;
        for id in &members {
            let Some(conn) = conns.get(id) else { continue };
            recipients += 1;
            if !conn.send(Arc::clone(&json)) {
                counter!("ws_broadcast_drops_total").increment(1);
                let drops = conn.drop_count();
                if drops >= MAX_TOTAL_DROPS {
                    warn!(connection = %conn.id, %room, drops, "disconnecting slow client");
                    conn.close();
                } else {
                    warn!(connection = %conn.id, %room, total_drops = drops, "failed to send event to client (channel full)");
                }
            }
        }
        debug!(
            event_type = %event.event_type,
            %room, recipients, "broadcast event"
        );
        Ok(())
    }
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BroadcastTransport for BroadcastManager {
    async fn add_to_group(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
    ) -> Result<(), TransportError> {
        if !self.connections.read().await.contains_key(connection) {
            return Err(TransportError::new(
                "add_to_group",
                format!("unknown connection {connection}"),
            ));
        }
        let _ = self
            .groups
            .write()
            .await
            .entry(room.clone())
            .or_default()
            .insert(connection.clone());
        Ok(())
    }

    async fn remove_from_group(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
    ) -> Result<(), TransportError> {
        let mut groups = self.groups.write().await;
        let now_empty = groups.get_mut(room).is_some_and(|members| {
            let _ = members.remove(connection);
            members.is_empty()
        });
        if now_empty {
            let _ = groups.remove(room);
        }
        Ok(())
    }

    async fn send_to_group(&self, room: &RoomId, event: &RoomEvent) -> Result<(), TransportError> {
        self.fan_out(room, &RpcEvent::from(event)).await
    }
}
