//! Method registry and async dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::warn;

use crate::rpc::context::RpcContext;
use crate::rpc::errors::{self, RpcError};
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Trait implemented by every RPC method handler.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Execute the handler with the given params and context.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Registry mapping method names to handlers.
///
/// Handlers run to completion. A room operation that was cut short between
/// its membership change and its group change would leave the two out of
/// step, so dispatch applies no timeout.
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a method name.
    pub fn register(&mut self, method: &str, handler: impl MethodHandler + 'static) {
        let _ = self.handlers.insert(method.to_owned(), Arc::new(handler));
    }

    /// Dispatch a request to the appropriate handler.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let method = request.method.clone();
        counter!("rpc_requests_total", "method" => method.clone()).increment(1);

        let Some(handler) = self.handlers.get(&method) else {
            counter!("rpc_errors_total", "method" => method.clone(), "error_type" => "method_not_found").increment(1);
            return RpcResponse::error(
                &request.id,
                errors::METHOD_NOT_FOUND,
                format!("Method '{method}' not found"),
            );
        };

        let start = Instant::now();
        let response = match handler.handle(request.params, ctx).await {
            Ok(result) => RpcResponse::success(&request.id, result),
            Err(err) => {
                counter!("rpc_errors_total", "method" => method.clone(), "error_type" => err.code()).increment(1);
                RpcResponse::from_error_body(&request.id, err.to_error_body())
            }
        };

        let duration = start.elapsed();
        histogram!("rpc_request_duration_seconds", "method" => method.clone())
            .record(duration.as_secs_f64());

        if duration.as_secs() >= 5 {
            warn!(
                method,
                duration_secs = duration.as_secs_f64(),
                "slow RPC request"
            );
        }

        response
    }

    /// List all registered method names (sorted).
    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a method is registered.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
