//! # aircall-core
//!
//! Connection and room membership bookkeeping for multi-party call rooms.
//!
//! - **Registry**: [`SessionRegistry`] maps each connection to its user name and room,
//!   with one atomic test-and-set gating `join` and one atomic remove gating `leave`
//! - **Events**: [`RoomEvent`] presence and text-message notifications for room members
//! - **Transport seam**: [`BroadcastTransport`] group membership + fan-out, supplied by the
//!   surrounding service
//! - **Hub**: [`CallHub`] pairs each registry step with the matching transport step
//! - **Test utilities**: [`test_utils::RecordingTransport`] in-memory transport

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod hub;
pub mod ids;
pub mod registry;
pub mod test_utils;
pub mod transport;

pub use errors::{HubError, RegistryError, TransportError};
pub use events::RoomEvent;
pub use hub::CallHub;
pub use ids::{ConnectionId, RoomId};
pub use registry::{Joined, Left, Membership, Outgoing, SessionRegistry};
pub use transport::BroadcastTransport;
