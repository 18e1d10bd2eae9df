//! Per-connection context passed to every RPC handler.

use aircall_core::{CallHub, ConnectionId};

/// Shared hub plus the identity of the calling connection.
///
/// Handlers never take a connection id from request params; the caller is
/// always the connection the request arrived on.
#[derive(Clone)]
pub struct RpcContext {
    /// Room operations.
    pub hub: CallHub,
    /// Connection the request arrived on.
    pub connection_id: ConnectionId,
}

impl RpcContext {
    /// Create a context for `connection_id`.
    pub fn new(hub: CallHub, connection_id: ConnectionId) -> Self {
        Self { hub, connection_id }
    }
}
