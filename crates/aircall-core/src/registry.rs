//! Session registry: the connection → (user, room) membership state machine.
//!
//! Each connection is either unregistered or in exactly one room. The
//! membership map is the single source of truth and is keyed by connection:
//!
//! - `join` is gated by one entry test-and-set: of any number of concurrent
//!   joins for the same connection exactly one sees a vacant slot.
//! - `leave` is gated by one entry removal: the first caller wins, later
//!   callers see `NotJoined`.
//!
//! A room roster (room → connections) is kept alongside so callers learn who a
//! notification reaches. The roster is only modified while the connection's
//! membership entry is held, so lock order is always membership → roster.
//! A roster that disagrees with the membership map is reported as
//! [`RegistryError::Defect`] and never repaired silently.
//!
//! Operations here only change state. Pairing a state change with transport
//! group membership and fan-out is done by [`CallHub`](crate::CallHub).

use std::collections::HashSet;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::errors::RegistryError;
use crate::ids::{ConnectionId, RoomId};

/// The (user, room) pair associated with one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    /// Display name supplied at join time.
    pub user: String,
    /// Room the connection belongs to.
    pub room: RoomId,
}

/// Facts about a committed join.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Joined {
    /// Connection that joined.
    pub connection: ConnectionId,
    /// Room joined.
    pub room: RoomId,
    /// Display name of the joiner.
    pub user: String,
    /// Room members after the join, joiner included (sorted).
    pub members: Vec<ConnectionId>,
}

/// Facts about a committed leave.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Left {
    /// Connection that left.
    pub connection: ConnectionId,
    /// Room left.
    pub room: RoomId,
    /// Display name the connection was registered under.
    pub user: String,
    /// Members still in the room (sorted). Empty when the room vanished.
    pub remaining: Vec<ConnectionId>,
}

/// A text message resolved against the sender's membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    /// Room the message goes to.
    pub room: RoomId,
    /// Display name of the sender.
    pub sender: String,
    /// Message body.
    pub text: String,
    /// Members the message reaches, sender included (sorted).
    pub recipients: Vec<ConnectionId>,
}

/// Concurrency-safe registry of connection memberships.
///
/// Construct one per process and share it behind an `Arc`; tests create a
/// fresh instance each.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    members: DashMap<ConnectionId, Membership>,
    rooms: DashMap<RoomId, HashSet<ConnectionId>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection` as `user` in `room`.
    ///
    /// Fails with [`RegistryError::AlreadyJoined`] carrying the room the
    /// connection is already in; nothing is mutated in that case.
    pub fn join(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
        user: &str,
    ) -> Result<Joined, RegistryError> {
        match self.members.entry(connection.clone()) {
            Entry::Occupied(existing) => {
                let current = existing.get().room.clone();
                debug!(%connection, %current, requested = %room, "join rejected, already in a room");
                Err(RegistryError::AlreadyJoined { room: current })
            }
            Entry::Vacant(slot) => {
                let members = {
                    let mut roster = self.rooms.entry(room.clone()).or_default();
                    let _ = roster.insert(connection.clone());
                    sorted(roster.iter())
                };
                let _ = slot.insert(Membership {
                    user: user.to_owned(),
                    room: room.clone(),
                });
                debug!(%connection, %room, user, members = members.len(), "joined room");
                Ok(Joined {
                    connection: connection.clone(),
                    room: room.clone(),
                    user: user.to_owned(),
                    members,
                })
            }
        }
    }

    /// Remove `connection` from its room.
    ///
    /// Fails with [`RegistryError::NotJoined`] when the connection is not
    /// registered, or [`RegistryError::Defect`] when the roster does not list
    /// a registered connection.
    pub fn leave(&self, connection: &ConnectionId) -> Result<Left, RegistryError> {
        let Entry::Occupied(entry) = self.members.entry(connection.clone()) else {
            return Err(RegistryError::NotJoined);
        };
        let room = entry.get().room.clone();

        let remaining = {
            let Some(mut roster) = self.rooms.get_mut(&room) else {
                return Err(RegistryError::Defect(format!(
                    "connection {connection} is registered in room {room} but the room has no roster"
                )));
            };
            if !roster.remove(connection) {
                return Err(RegistryError::Defect(format!(
                    "connection {connection} is registered in room {room} but missing from its roster"
                )));
            }
            sorted(roster.iter())
        };
        if remaining.is_empty() {
            let _ = self.rooms.remove_if(&room, |_, roster| roster.is_empty());
        }

        let (_, membership) = entry.remove_entry();
        debug!(%connection, %room, user = %membership.user, remaining = remaining.len(), "left room");
        Ok(Left {
            connection: connection.clone(),
            room,
            user: membership.user,
            remaining,
        })
    }

    /// Resolve a text message from `connection` to its room and recipients.
    ///
    /// Performs no mutation.
    pub fn send_message(
        &self,
        connection: &ConnectionId,
        text: &str,
    ) -> Result<Outgoing, RegistryError> {
        let Some(membership) = self.members.get(connection) else {
            return Err(RegistryError::NotJoined);
        };
        // Roster is read under the membership guard so a concurrent leave
        // cannot slip in between the two lookups.
        let recipients = self
            .rooms
            .get(&membership.room)
            .filter(|roster| roster.contains(connection))
            .map(|roster| sorted(roster.iter()))
            .ok_or_else(|| {
                RegistryError::Defect(format!(
                    "connection {connection} is registered in room {} but missing from its roster",
                    membership.room
                ))
            })?;

        Ok(Outgoing {
            room: membership.room.clone(),
            sender: membership.user.clone(),
            text: text.to_owned(),
            recipients,
        })
    }

    /// Current membership of `connection`, if any.
    pub fn membership(&self, connection: &ConnectionId) -> Option<Membership> {
        self.members.get(connection).map(|m| m.clone())
    }

    /// Whether `connection` is currently in a room.
    pub fn is_joined(&self, connection: &ConnectionId) -> bool {
        self.members.contains_key(connection)
    }

    /// Connections currently in `room` (sorted). Empty for unknown rooms.
    pub fn room_members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|roster| sorted(roster.iter()))
            .unwrap_or_default()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.members.len()
    }

    /// Number of non-empty rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

fn sorted<'a>(ids: impl Iterator<Item = &'a ConnectionId>) -> Vec<ConnectionId> {
    let mut out: Vec<ConnectionId> = ids.cloned().collect();
    out.sort();
    out
}
