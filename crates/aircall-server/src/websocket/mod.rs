//! WebSocket transport: per-client sessions and room group fan-out.

pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod session;
