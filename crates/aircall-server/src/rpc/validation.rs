//! Input validation helpers for RPC parameters.

use serde_json::Value;

use super::errors::RpcError;

/// Maximum room id / user name length (256 bytes).
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum text message length (16 KB).
pub const MAX_MESSAGE_LENGTH: usize = 16_384;

/// Extract a required parameter from the params object.
pub fn require_param<'a>(params: Option<&'a Value>, key: &str) -> Result<&'a Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required parameter: {key}"),
        })
}

/// Extract a required string parameter no longer than `max_len` bytes.
pub fn require_string_param(
    params: Option<&Value>,
    key: &str,
    max_len: usize,
) -> Result<String, RpcError> {
    let value = require_param(params, key)?
        .as_str()
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        })?;
    validate_string_param(value, key, max_len)?;
    Ok(value.to_owned())
}

/// Validate that a string parameter does not exceed `max_len` bytes.
pub fn validate_string_param(value: &str, name: &str, max_len: usize) -> Result<(), RpcError> {
    if value.len() > max_len {
        return Err(RpcError::InvalidParams {
            message: format!(
                "Parameter '{name}' exceeds maximum length ({} > {max_len})",
                value.len()
            ),
        });
    }
    Ok(())
}
