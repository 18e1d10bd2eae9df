//! Room handlers: join, leave, sendTextMessage.
//!
//! Each handler maps one request onto the matching [`CallHub`](aircall_core::CallHub)
//! operation for the calling connection. Presence and text events reach the
//! room through the broadcast transport, not through the response.

use aircall_core::RoomId;
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::registry::{MethodHandler, MethodRegistry};
use crate::rpc::validation::{MAX_MESSAGE_LENGTH, MAX_NAME_LENGTH, require_string_param};

/// Register every room method.
pub fn register_all(registry: &mut MethodRegistry) {
    registry.register("room.join", JoinRoomHandler);
    registry.register("room.leave", LeaveRoomHandler);
    registry.register("room.sendTextMessage", SendTextMessageHandler);
}

/// `room.join {roomId, userName}`
pub struct JoinRoomHandler;

#[async_trait]
impl MethodHandler for JoinRoomHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let room = require_string_param(params.as_ref(), "roomId", MAX_NAME_LENGTH)?;
        let user = require_string_param(params.as_ref(), "userName", MAX_NAME_LENGTH)?;

        let joined = ctx
            .hub
            .join(&ctx.connection_id, &RoomId::from(room), &user)
            .await?;

        Ok(json!({
            "roomId": joined.room,
            "userName": joined.user,
            "members": joined.members.len(),
        }))
    }
}

/// `room.leave`
pub struct LeaveRoomHandler;

#[async_trait]
impl MethodHandler for LeaveRoomHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let left = ctx.hub.leave(&ctx.connection_id).await?;
        Ok(json!({
            "roomId": left.room,
            "remaining": left.remaining.len(),
        }))
    }
}

/// `room.sendTextMessage {message}`
pub struct SendTextMessageHandler;

#[async_trait]
impl MethodHandler for SendTextMessageHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let message = require_string_param(params.as_ref(), "message", MAX_MESSAGE_LENGTH)?;
        let outgoing = ctx.hub.send_message(&ctx.connection_id, &message).await?;
        Ok(json!({
            "roomId": outgoing.room,
            "recipients": outgoing.recipients.len(),
        }))
    }
}
