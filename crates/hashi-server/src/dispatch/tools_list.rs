//! Handles the `tools/list` MCP method.

use hashi_protocol::jsonrpc::{error_codes, JsonRpcErrorResponse, JsonRpcResponse, RequestId};
use hashi_protocol::mcp::tools::ToolsListResult;

use crate::handler::JsonRpcOutput;
use crate::registry::ToolRegistry;

/// Handles the `tools/list` request with the registry's definitions.
pub(crate) fn handle(id: RequestId, registry: &dyn ToolRegistry) -> JsonRpcOutput {
    let result = ToolsListResult {
        tools: registry.list(),
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
