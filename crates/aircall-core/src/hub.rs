//! `CallHub`: the operations the dispatch layer calls.
//!
//! Each operation runs the registry step first and, once it has committed,
//! the matching transport steps:
//!
//! | Operation | Registry | Transport |
//! |-----------|----------|-----------|
//! | `join` | membership test-and-set | `add_to_group`, then `NewRoomUser` fan-out |
//! | `leave` | membership remove | `remove_from_group`, then `UserLeftRoom` fan-out |
//! | `send_message` | membership read | `TextMessage` fan-out |
//!
//! Because the group add happens before the fan-out, a joiner is told about its
//! own join; because the group remove happens before the fan-out, a leaver is not.
//!
//! A transport failure does not roll back the registry step. A connection whose
//! group add failed stays joined and a later `leave` cleans it up.
//!
//! Operations for one connection are serialized through a per-connection gate
//! held across both steps, so overlapping requests from the same connection
//! cannot leave its group membership out of step with the registry. Distinct
//! connections never wait on each other.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::errors::{HubError, RegistryError, TransportError};
use crate::events::RoomEvent;
use crate::ids::{ConnectionId, RoomId};
use crate::registry::{Joined, Left, Outgoing, SessionRegistry};
use crate::transport::BroadcastTransport;

/// Pairs the [`SessionRegistry`] with a [`BroadcastTransport`].
#[derive(Clone)]
pub struct CallHub {
    registry: Arc<SessionRegistry>,
    transport: Arc<dyn BroadcastTransport>,
    gates: Arc<DashMap<ConnectionId, Arc<Mutex<()>>>>,
}

impl CallHub {
    /// Create a hub over an existing registry and transport.
    pub fn new(registry: Arc<SessionRegistry>, transport: Arc<dyn BroadcastTransport>) -> Self {
        Self {
            registry,
            transport,
            gates: Arc::new(DashMap::new()),
        }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Join `room` as `user` and announce it to the room.
    #[instrument(skip_all, fields(connection = %connection, room = %room, user = %user))]
    pub async fn join(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
        user: &str,
    ) -> Result<Joined, HubError> {
        self.serialized(connection, self.join_steps(connection, room, user))
            .await
    }

    /// Leave the current room and tell the remaining members.
    #[instrument(skip_all, fields(connection = %connection))]
    pub async fn leave(&self, connection: &ConnectionId) -> Result<Left, HubError> {
        match self
            .serialized(connection, self.leave_steps(connection))
            .await?
        {
            Some(left) => Ok(left),
            None => Err(rejected("leave", RegistryError::NotJoined)),
        }
    }

    /// Send a text message to every member of the sender's room, sender included.
    #[instrument(skip_all, fields(connection = %connection))]
    pub async fn send_message(
        &self,
        connection: &ConnectionId,
        text: &str,
    ) -> Result<Outgoing, HubError> {
        self.serialized(connection, self.send_steps(connection, text))
            .await
    }

    /// Leave the current room if the connection is in one.
    ///
    /// Used on disconnect, where "not joined" is the normal case and not an error.
    #[instrument(skip_all, fields(connection = %connection))]
    pub async fn leave_if_joined(&self, connection: &ConnectionId) -> Result<Option<Left>, HubError> {
        self.serialized(connection, self.leave_steps(connection))
            .await
    }

    /// Number of connections with an operation in flight or waiting.
    pub fn busy_connections(&self) -> usize {
        self.gates.len()
    }

    /// Run `steps` while holding the gate for `connection`.
    async fn serialized<T>(&self, connection: &ConnectionId, steps: impl Future<Output = T>) -> T {
        let gate = Arc::clone(
            self.gates
                .entry(connection.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let out = {
            let _turn = gate.lock().await;
            steps.await
        };
        drop(gate);
        // Clones are only handed out under the shard lock, so a count of one
        // here means nobody holds or awaits this gate.
        let _ = self
            .gates
            .remove_if(connection, |_, gate| Arc::strong_count(gate) == 1);
        out
    }

    async fn join_steps(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
        user: &str,
    ) -> Result<Joined, HubError> {
        let joined = self
            .registry
            .join(connection, room, user)
            .map_err(|e| rejected("join", e))?;
        counter!("room_joins_total").increment(1);

        self.transport
            .add_to_group(connection, room)
            .await
            .map_err(|e| transport_failed("join", e))?;
        let event = RoomEvent::NewRoomUser {
            user: user.to_owned(),
        };
        self.transport
            .send_to_group(room, &event)
            .await
            .map_err(|e| transport_failed("join", e))?;

        info!(members = joined.members.len(), "user joined room");
        Ok(joined)
    }

    /// `Ok(None)` when the connection is not in a room.
    async fn leave_steps(&self, connection: &ConnectionId) -> Result<Option<Left>, HubError> {
        let left = match self.registry.leave(connection) {
            Ok(left) => left,
            Err(RegistryError::NotJoined) => return Ok(None),
            Err(e) => return Err(rejected("leave", e)),
        };
        counter!("room_leaves_total").increment(1);

        self.transport
            .remove_from_group(connection, &left.room)
            .await
            .map_err(|e| transport_failed("leave", e))?;
        let event = RoomEvent::UserLeftRoom {
            user: left.user.clone(),
        };
        self.transport
            .send_to_group(&left.room, &event)
            .await
            .map_err(|e| transport_failed("leave", e))?;

        info!(
            room = %left.room,
            user = %left.user,
            remaining = left.remaining.len(),
            "user left room"
        );
        Ok(Some(left))
    }

    async fn send_steps(&self, connection: &ConnectionId, text: &str) -> Result<Outgoing, HubError> {
        let outgoing = self
            .registry
            .send_message(connection, text)
            .map_err(|e| rejected("send_message", e))?;
        counter!("room_messages_total").increment(1);

        let event = RoomEvent::TextMessage {
            sender: outgoing.sender.clone(),
            message: outgoing.text.clone(),
        };
        self.transport
            .send_to_group(&outgoing.room, &event)
            .await
            .map_err(|e| transport_failed("send_message", e))?;

        Ok(outgoing)
    }
}

fn rejected(operation: &'static str, err: RegistryError) -> HubError {
    if let RegistryError::Defect(ref detail) = err {
        error!(operation, detail = %detail, "registry consistency fault");
    } else {
        warn!(operation, error = %err, "request rejected");
    }
    let kind = if err.is_protocol() { "protocol" } else { "defect" };
    counter!("room_errors_total", "operation" => operation, "kind" => kind).increment(1);
    err.into()
}

fn transport_failed(operation: &'static str, err: TransportError) -> HubError {
    warn!(operation, error = %err, "transport step failed after registry commit");
    counter!("room_errors_total", "operation" => operation, "kind" => "transport").increment(1);
    err.into()
}
