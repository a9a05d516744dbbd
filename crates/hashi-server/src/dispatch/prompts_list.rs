//! Handles the `prompts/list` MCP method.

use hashi_protocol::jsonrpc::{error_codes, JsonRpcErrorResponse, JsonRpcResponse, RequestId};
use hashi_protocol::mcp::prompts::PromptsListResult;

use crate::handler::JsonRpcOutput;

/// Handles the `prompts/list` request. The endpoint exposes no prompts;
/// the result is always an empty array.
pub(crate) fn handle(id: RequestId) -> JsonRpcOutput {
    match serde_json::to_value(PromptsListResult::default()) {
        Ok(v) => JsonRpcOutput::Success(JsonRpcResponse::success(id, v)),
        Err(e) => JsonRpcOutput::Error(JsonRpcErrorResponse::error(
            id,
            error_codes::INTERNAL_ERROR,
            e.to_string(),
        )),
    }
}
