//! RPC wire-format types.

use aircall_core::RoomEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Incoming RPC request from a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequest {
    /// Client-chosen request identifier, echoed in the response.
    pub id: String,
    /// Method name (e.g. `room.join`).
    pub method: String,
    /// Optional parameters object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Outgoing RPC response to a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Echoed request identifier.
    pub id: String,
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload (present when `success == true`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload (present when `success == false`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// Structured error body inside an `RpcResponse`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Machine-readable error code (e.g. `ALREADY_JOINED`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Optional structured details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Server-pushed event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcEvent {
    /// Event type (e.g. `room.userJoined`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    /// Build a success response.
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response.
    pub fn error(id: impl Into<String>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
        }
    }

    /// Build an error response from a prepared body.
    pub fn from_error_body(id: impl Into<String>, body: RpcErrorBody) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(body),
        }
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

impl RpcEvent {
    /// Create a new event with the current UTC timestamp.
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            data,
        }
    }
}

impl From<&RoomEvent> for RpcEvent {
    fn from(event: &RoomEvent) -> Self {
        Self::new(event.event_type(), Some(event.data()))
    }
}
