//! # aircall-server
//!
//! Axum HTTP + WebSocket front end for the AirCall room registry.
//!
//! - [`server::AirCallServer`] owns the router, the connection limit and shutdown
//! - [`websocket`] runs one session per client and fans room events out by group
//! - [`rpc`] maps `room.*` requests onto [`aircall_core::CallHub`] operations

#![deny(unsafe_code)]

pub mod config;
pub mod health;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;
