//! WebSocket message dispatch: parses incoming text as `RpcRequest` and
//! routes through the `MethodRegistry`.

use tracing::{debug, instrument, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::errors;
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Result of handling a WebSocket message.
pub struct HandleResult {
    /// Serialized JSON response to send back.
    pub response_json: String,
    /// The RPC method that was called (empty if parse failed).
    pub method: String,
    /// Typed response (for extracting structured data without re-parsing).
    pub response: RpcResponse,
}

impl HandleResult {
    /// Whether the session should drop the connection after replying.
    pub fn is_fatal(&self) -> bool {
        self.response.error_code() == Some(errors::INTERNAL_ERROR)
    }
}

/// Handle an incoming WebSocket text message.
///
/// Parses the message as an `RpcRequest`, dispatches to the registry, and
/// returns the serialized `RpcResponse` along with the method name.
#[instrument(skip_all, fields(method))]
pub async fn handle_message(
    message: &str,
    registry: &MethodRegistry,
    ctx: &RpcContext,
) -> HandleResult {
    let request: RpcRequest = match serde_json::from_str(message) {
        Ok(r) => r,
        Err(e) => {
            warn!(connection = %ctx.connection_id, "invalid JSON received");
            let resp =
                RpcResponse::error("unknown", errors::INVALID_PARAMS, format!("Invalid JSON: {e}"));
            return finish(String::new(), resp);
        }
    };

    let method = request.method.clone();
    let _ = tracing::Span::current().record("method", method.as_str());
    debug!(method, id = %request.id, connection = %ctx.connection_id, "dispatching RPC");

    if !registry.has_method(&method) {
        warn!(method, "unknown RPC method");
    }

    let response = registry.dispatch(request, ctx).await;
    finish(method, response)
}

fn finish(method: String, response: RpcResponse) -> HandleResult {
    let response_json = serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        String::new()
    });
    HandleResult {
        response_json,
        method,
        response,
    }
}
