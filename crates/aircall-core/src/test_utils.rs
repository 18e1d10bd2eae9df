//! In-memory [`BroadcastTransport`] for tests.
//!
//! [`RecordingTransport`] keeps group membership and a per-connection inbox of
//! every event fanned out to it, records each call in order, and can be told
//! to fail a given operation.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::TransportError;
use crate::events::RoomEvent;
use crate::ids::{ConnectionId, RoomId};
use crate::transport::BroadcastTransport;

/// One call made against a [`RecordingTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportCall {
    /// `add_to_group(connection, room)`
    AddToGroup(ConnectionId, RoomId),
    /// `remove_from_group(connection, room)`
    RemoveFromGroup(ConnectionId, RoomId),
    /// `send_to_group(room, event)`
    SendToGroup(RoomId, RoomEvent),
}

#[derive(Default)]
struct State {
    groups: HashMap<RoomId, BTreeSet<ConnectionId>>,
    inboxes: HashMap<ConnectionId, Vec<RoomEvent>>,
    calls: Vec<TransportCall>,
    failing: HashSet<&'static str>,
}

/// Transport that delivers into in-memory inboxes.
#[derive(Default)]
pub struct RecordingTransport {
    state: Mutex<State>,
}

impl RecordingTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call to `operation` fail.
    pub fn fail_on(&self, operation: &'static str) {
        let _ = self.state.lock().failing.insert(operation);
    }

    /// Stop injecting failures.
    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    /// Events delivered to `connection` so far.
    pub fn inbox(&self, connection: &ConnectionId) -> Vec<RoomEvent> {
        self.state
            .lock()
            .inboxes
            .get(connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Empty every inbox.
    pub fn clear_inboxes(&self) {
        self.state.lock().inboxes.clear();
    }

    /// Current members of the group for `room` (sorted).
    pub fn group_members(&self, room: &RoomId) -> Vec<ConnectionId> {
        self.state
            .lock()
            .groups
            .get(room)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<TransportCall> {
        self.state.lock().calls.clone()
    }
}

impl State {
    fn check(&self, operation: &'static str) -> Result<(), TransportError> {
        if self.failing.contains(operation) {
            Err(TransportError::new(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BroadcastTransport for RecordingTransport {
    async fn add_to_group(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check("add_to_group")?;
        state
            .calls
            .push(TransportCall::AddToGroup(connection.clone(), room.clone()));
        let _ = state
            .groups
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
        let mut state = self.state.lock();
        state.check("remove_from_group")?;
        state
            .calls
            .push(TransportCall::RemoveFromGroup(connection.clone(), room.clone()));
        let now_empty = state.groups.get_mut(room).is_some_and(|group| {
            let _ = group.remove(connection);
            group.is_empty()
        });
        if now_empty {
            let _ = state.groups.remove(room);
        }
        Ok(())
    }

    async fn send_to_group(&self, room: &RoomId, event: &RoomEvent) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.check("send_to_group")?;
        state
            .calls
            .push(TransportCall::SendToGroup(room.clone(), event.clone()));
        let members: Vec<ConnectionId> = state
            .groups
            .get(room)
            .map(|g| g.iter().cloned().collect())
            .unwrap_or_default();
        for member in members {
            state.inboxes.entry(member).or_default().push(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_reaches_group_members_only() {
        let t = RecordingTransport::new();
        t.add_to_group(&"a".into(), &"R1".into()).await.unwrap();
        t.add_to_group(&"b".into(), &"R2".into()).await.unwrap();
        let ev = RoomEvent::NewRoomUser { user: "a".into() };
        t.send_to_group(&"R1".into(), &ev).await.unwrap();

        assert_eq!(t.inbox(&"a".into()), vec![ev]);
        assert!(t.inbox(&"b".into()).is_empty());
    }

    #[tokio::test]
    async fn empty_group_is_dropped() {
        let t = RecordingTransport::new();
        t.add_to_group(&"a".into(), &"R1".into()).await.unwrap();
        t.remove_from_group(&"a".into(), &"R1".into()).await.unwrap();
        assert!(t.group_members(&"R1".into()).is_empty());
        assert!(t.state.lock().groups.is_empty());
    }

    #[tokio::test]
    async fn injected_failure_is_not_recorded() {
        let t = RecordingTransport::new();
        t.fail_on("add_to_group");
        let err = t.add_to_group(&"a".into(), &"R1".into()).await.unwrap_err();
        assert_eq!(err.operation, "add_to_group");
        assert!(t.calls().is_empty());
        assert!(t.group_members(&"R1".into()).is_empty());

        t.clear_failures();
        t.add_to_group(&"a".into(), &"R1".into()).await.unwrap();
        assert_eq!(t.calls().len(), 1);
    }
}
