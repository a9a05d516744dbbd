//! JSON-RPC 2.0 envelopes.
//!
//! The endpoint exchanges exactly one envelope per WebSocket message:
//! requests and notifications inbound, responses and notifications
//! outbound. A response always echoes the id of the request it answers;
//! when a payload is so broken that its id cannot be recovered, the
//! error response carries `id: null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlates a response with the request that caused it.
///
/// JSON-RPC permits numbers, strings and `null`. The endpoint itself
/// only ever originates `Null`, on error responses to payloads whose id
/// could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
    /// The JSON `null` id.
    Null,
}

/// Inbound request: carries an id and expects exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always the literal `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id, echoed back in the response.
    pub id: RequestId,
    /// Name of the method to invoke.
    pub method: String,
    /// Method arguments, when the method takes any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Notification: a request without an id. Never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always the literal `"2.0"`.
    pub jsonrpc: String,
    /// Name of the notified method.
    pub method: String,
    /// Notification payload, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Successful response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always the literal `"2.0"`.
    pub jsonrpc: String,
    /// Id of the answered request.
    pub id: RequestId,
    /// Whatever the method produced.
    pub result: Value,
}

/// Failed response to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    /// Always the literal `"2.0"`.
    pub jsonrpc: String,
    /// Id of the answered request, or `null` when unknowable.
    pub id: RequestId,
    /// What went wrong.
    pub error: JsonRpcError,
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// One of the codes in [`error_codes`], or a method-defined code.
    pub code: i32,
    /// Short description of the failure.
    pub message: String,
    /// Failure detail (e.g. the text of a handler's own error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Error codes reserved by the JSON-RPC 2.0 specification.
pub mod error_codes {
    /// The payload was not valid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// The payload was JSON but not a valid request envelope.
    pub const INVALID_REQUEST: i32 = -32600;
    /// No handler is registered for the method.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// The params did not match what the method expects.
    pub const INVALID_PARAMS: i32 = -32602;
    /// The handler itself failed.
    pub const INTERNAL_ERROR: i32 = -32603;
}

impl JsonRpcRequest {
    /// Builds a request envelope for the given method.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcNotification {
    /// Builds a notification envelope for the given method.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

impl JsonRpcResponse {
    /// Builds the success response for request `id`.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }
}

impl JsonRpcError {
    /// Builds an error with no detail payload.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Builds an error whose `data` member carries failure detail.
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl JsonRpcErrorResponse {
    /// Builds the error response for request `id`.
    pub fn error(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error: JsonRpcError::new(code, message),
        }
    }

    /// Builds the error response for request `id`, with failure detail
    /// in the error's `data` member.
    pub fn error_with_data(
        id: RequestId,
        code: i32,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            error: JsonRpcError::with_data(code, message, data),
        }
    }
}
