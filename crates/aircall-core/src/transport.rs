//! Broadcast transport seam.
//!
//! The registry never touches sockets. Whatever carries bytes to clients
//! implements [`BroadcastTransport`]: named groups keyed by room, membership
//! management, and best-effort fan-out to the current members of a group.

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::events::RoomEvent;
use crate::ids::{ConnectionId, RoomId};

/// Group membership and fan-out provided by the surrounding service.
///
/// Membership changes are expected to take effect for every fan-out issued
/// after the call returns. Fan-out is fire-and-forget: `Ok` means the event
/// was handed to the transport, not that every member received it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Add `connection` to the group for `room`.
    async fn add_to_group(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
    ) -> Result<(), TransportError>;

    /// Remove `connection` from the group for `room`.
    async fn remove_from_group(
        &self,
        connection: &ConnectionId,
        room: &RoomId,
    ) -> Result<(), TransportError>;

    /// Deliver `event` to every connection currently in the group for `room`.
    async fn send_to_group(&self, room: &RoomId, event: &RoomEvent) -> Result<(), TransportError>;
}
