//! Error types for registry, transport, and hub operations.

use crate::ids::RoomId;

/// Errors produced by [`SessionRegistry`](crate::SessionRegistry) state transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The connection is already in a room and must leave before joining another.
    #[error("You have already joined the room {room}")]
    AlreadyJoined {
        /// Room the connection currently belongs to.
        room: RoomId,
    },

    /// The connection has not joined any room (or has already left).
    #[error("You aren't connected to any room")]
    NotJoined,

    /// The registry's own bookkeeping disagrees with itself.
    #[error("Internal consistency fault: {0}")]
    Defect(String),
}

impl RegistryError {
    /// Whether this is a caller-protocol error (expected, recoverable).
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::AlreadyJoined { .. } | Self::NotJoined)
    }
}

/// Errors reported by a [`BroadcastTransport`](crate::BroadcastTransport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transport {operation} failed: {message}")]
pub struct TransportError {
    /// Operation that failed (`add_to_group`, `remove_from_group`, `send_to_group`).
    pub operation: &'static str,
    /// Description of the failure.
    pub message: String,
}

impl TransportError {
    /// Create a new transport error.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Errors returned by [`CallHub`](crate::CallHub) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// Registry rejected the request or found an internal fault.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Group management or fan-out failed after the registry step committed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl HubError {
    /// Whether this error signals a bug in the registry rather than a caller or transport issue.
    pub fn is_defect(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::Defect(_)))
    }

    /// Error category string for logging and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Registry(RegistryError::AlreadyJoined { .. }) => "already_joined",
            Self::Registry(RegistryError::NotJoined) => "not_joined",
            Self::Registry(RegistryError::Defect(_)) => "defect",
            Self::Transport(_) => "transport",
        }
    }
}
