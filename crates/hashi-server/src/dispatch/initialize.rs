//! Handles the `initialize` MCP method.

use hashi_protocol::jsonrpc::{error_codes, JsonRpcErrorResponse, JsonRpcResponse, RequestId};
use hashi_protocol::mcp::initialize::{
    InitializeResult, ServerCapabilities, ServerInfo, PROTOCOL_VERSION,
};

use crate::handler::JsonRpcOutput;

/// Handles the `initialize` request and returns the server capabilities.
pub(crate) fn handle(id: RequestId) -> JsonRpcOutput {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities::advertised(),
        server_info: ServerInfo {
            name: "hashi".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    match serde_json::to_value(result) {
        Ok(v) => JsonRpcOutput::Success(JsonRpcResponse::success(id, v)),
        Err(e) => JsonRpcOutput::Error(JsonRpcErrorResponse::error(
            id,
            error_codes::INTERNAL_ERROR,
            e.to_string(),
        )),
    }
}
