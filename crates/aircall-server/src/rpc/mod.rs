//! Request/response protocol spoken over the signaling WebSocket.

pub mod context;
pub mod errors;
pub mod handlers;
pub mod registry;
pub mod types;
pub mod validation;
