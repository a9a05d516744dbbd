//! Handles the `tools/call` MCP method.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinError;
use tracing::{debug, warn};

use hashi_protocol::jsonrpc::{error_codes, JsonRpcErrorResponse, JsonRpcResponse, RequestId};
use hashi_protocol::mcp::tools::ToolsCallParams;

use crate::handler::{DispatchOutcome, JsonRpcOutput};
use crate::registry::{ToolContext, ToolOutcome, ToolRegistry};

/// Handles the `tools/call` request by delegating to the registry.
///
/// The invocation runs on its own task so a panicking handler cannot
/// take down the endpoint's event loop; the task is awaited inline, so
/// handlers still never run in parallel. A handler that panics (or a
/// task that otherwise fails) is answered with `-32603` carrying the
/// failure text in the error's `data` member.
///
/// A deferred outcome carries the continuation token back to the event
/// loop, which records the pending request; no response is emitted on
/// this path.
pub(crate) async fn handle(
    id: RequestId,
    params: Option<Value>,
    ctx: ToolContext,
    registry: Arc<dyn ToolRegistry>,
) -> DispatchOutcome {
    // 1. Parse params.
    let call_params = match params {
        Some(p) => match serde_json::from_value::<ToolsCallParams>(p) {
            Ok(cp) => cp,
            Err(e) => {
                return reply(JsonRpcOutput::Error(JsonRpcErrorResponse::error(
                    id,
                    error_codes::INVALID_PARAMS,
                    format!("invalid tools/call params: {e}"),
                )));
            }
        },
        None => {
            return reply(JsonRpcOutput::Error(JsonRpcErrorResponse::error(
                id,
                error_codes::INVALID_PARAMS,
                "tools/call requires params",
            )));
        }
    };

    debug!(tool = %call_params.name, client_id = %ctx.client.id, "invoking tool");

    // 2. Invoke, isolated from the event loop.
    let invocation = tokio::spawn(async move { registry.invoke(ctx, call_params).await });

    // 3. Map the outcome.
    match invocation.await {
        Ok(ToolOutcome::Ok(result)) => {
            reply(JsonRpcOutput::Success(JsonRpcResponse::success(id, result)))
        }
        Ok(ToolOutcome::Err(error)) => reply(JsonRpcOutput::Error(JsonRpcErrorResponse {
            jsonrpc: "2.0".to_string(),
            id,
            error,
        })),
        Ok(ToolOutcome::Deferred(token)) => {
            debug!(%token, "tool deferred its response");
            DispatchOutcome::Deferred { token, id }
        }
        Err(failure) => {
            let detail = failure_detail(failure);
            warn!(error = %detail, "tool handler failed");
            reply(JsonRpcOutput::Error(JsonRpcErrorResponse::error_with_data(
                id,
                error_codes::INTERNAL_ERROR,
                "Internal error",
                Value::String(detail),
            )))
        }
    }
}

/// Best-effort extraction of a failed invocation's message for the
/// error `data` member.
fn failure_detail(failure: JoinError) -> String {
    if failure.is_panic() {
        let payload = failure.into_panic();
        if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "tool handler panicked".to_string()
        }
    } else {
        failure.to_string()
    }
}

fn reply(output: JsonRpcOutput) -> DispatchOutcome {
    DispatchOutcome::Reply(output.to_json())
}
