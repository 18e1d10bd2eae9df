//! RPC error codes and error type.

use aircall_core::{HubError, RegistryError};
use serde_json::json;

use crate::rpc::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Connection is already in a room.
pub const ALREADY_JOINED: &str = "ALREADY_JOINED";
/// Connection is not in any room.
pub const NOT_JOINED: &str = "NOT_JOINED";
/// Group management or fan-out failed.
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
/// Unexpected internal error. The session closes the connection after sending it.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// `room.join` while already in a room.
    #[error("You have already joined the room {room_id}")]
    AlreadyJoined {
        /// Room the connection is currently in.
        room_id: String,
    },

    /// Leave or send without a room.
    #[error("You aren't connected to any room")]
    NotJoined,

    /// The transport failed after the membership change was committed.
    #[error("{message}")]
    Transport {
        /// Description.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::AlreadyJoined { .. } => ALREADY_JOINED,
            Self::NotJoined => NOT_JOINED,
            Self::Transport { .. } => TRANSPORT_ERROR,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::AlreadyJoined { room_id } => Some(json!({ "roomId": room_id })),
                _ => None,
            },
        }
    }
}

impl From<HubError> for RpcError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Registry(RegistryError::AlreadyJoined { room }) => Self::AlreadyJoined {
                room_id: room.into_inner(),
            },
            HubError::Registry(RegistryError::NotJoined) => Self::NotJoined,
            HubError::Registry(RegistryError::Defect(_)) => Self::Internal {
                message: "Internal error".into(),
            },
            HubError::Transport(e) => Self::Transport {
                message: e.to_string(),
            },
        }
    }
}
