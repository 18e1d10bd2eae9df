//! Notifications fanned out to room members.

use serde::{Deserialize, Serialize};

/// Event delivered to every member of a room.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RoomEvent {
    /// A user joined the room. The joiner receives this too.
    #[serde(rename = "room.userJoined")]
    NewRoomUser {
        /// Display name of the new member.
        user: String,
    },

    /// A user left the room. Sent to the remaining members only.
    #[serde(rename = "room.userLeft")]
    UserLeftRoom {
        /// Display name of the departed member.
        user: String,
    },

    /// A text message from a room member. The sender receives it too.
    #[serde(rename = "room.textMessage")]
    TextMessage {
        /// Display name of the sender.
        sender: String,
        /// Message body.
        message: String,
    },
}

impl RoomEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::NewRoomUser { .. } => "room.userJoined",
            Self::UserLeftRoom { .. } => "room.userLeft",
            Self::TextMessage { .. } => "room.textMessage",
        }
    }

    /// Event payload without the type tag.
    pub fn data(&self) -> serde_json::Value {
        match self {
            Self::NewRoomUser { user } | Self::UserLeftRoom { user } => {
                serde_json::json!({ "user": user })
            }
            Self::TextMessage { sender, message } => {
                serde_json::json!({ "sender": sender, "message": message })
            }
        }
    }
}
