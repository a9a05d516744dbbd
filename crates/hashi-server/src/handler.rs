//! MCP method dispatch handler.
//!
//! Parses the JSON-RPC envelope out of a raw WebSocket payload, routes
//! requests to the appropriate method handler, and builds responses.
//! Notifications are handled silently; `tools/call` may defer its
//! response until the tool resolves its token.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use hashi_protocol::jsonrpc::{
    error_codes, JsonRpcErrorResponse, JsonRpcResponse, RequestId,
};
use hashi_protocol::mcp::methods;

use crate::dispatch;
use crate::registry::{ToolContext, ToolRegistry};

/// Enum representing either a success or error JSON-RPC response.
#[derive(Debug)]
pub(crate) enum JsonRpcOutput {
    /// Success response.
    Success(JsonRpcResponse),
    /// Error response.
    Error(JsonRpcErrorResponse),
}

impl JsonRpcOutput {
    /// Serializes the output to a JSON string.
    pub(crate) fn to_json(&self) -> String {
        let serialized = match self {
            Self::Success(r) => serde_json::to_string(r),
            Self::Error(r) => serde_json::to_string(r),
        };
        match serialized {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                format!(
                    r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"Internal error"}}}}"#,
                    error_codes::INTERNAL_ERROR
                )
            }
        }
    }
}

/// Result of dispatching one inbound payload.
#[derive(Debug)]
pub(crate) enum DispatchOutcome {
    /// A serialized envelope to send back.
    Reply(String),
    /// The handler parked the request; the response is emitted when the
    /// token resolves.
    Deferred { token: String, id: RequestId },
    /// Nothing to send (notification).
    Silent,
}

/// Routes JSON-RPC requests to MCP method handlers.
pub(crate) struct McpDispatcher {
    registry: Arc<dyn ToolRegistry>,
}

impl McpDispatcher {
    pub(crate) fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatches one raw message payload.
    pub(crate) async fn dispatch(&self, ctx: ToolContext, raw: &str) -> DispatchOutcome {
        // 1. The payload must be JSON at all.
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to parse JSON-RPC message");
                return reply_error(RequestId::Null, error_codes::PARSE_ERROR, "Parse error");
            }
        };

        // 2. It must be a JSON-RPC 2.0 envelope.
        let Some(envelope) = value.as_object() else {
            return reply_error(
                extract_id(&value),
                error_codes::INVALID_REQUEST,
                "Invalid Request",
            );
        };
        if envelope.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return reply_error(
                extract_id(&value),
                error_codes::INVALID_REQUEST,
                "Invalid Request",
            );
        }

        let method = envelope.get("method").and_then(Value::as_str);
        let params = envelope.get("params").cloned();

        // 3. No id means notification: handled silently, never answered.
        if !envelope.contains_key("id") {
            match method {
                Some(methods::INITIALIZED) => {
                    debug!(client_id = %ctx.client.id, "client initialized");
                }
                Some(other) => {
                    debug!(method = other, "ignoring notification");
                }
                None => {
                    warn!("notification without method");
                }
            }
            return DispatchOutcome::Silent;
        }

        let id = extract_id(&value);
        let Some(method) = method else {
            return reply_error(id, error_codes::INVALID_REQUEST, "Invalid Request");
        };

        debug!(method, client_id = %ctx.client.id, "dispatching MCP request");

        // 4. Route to the method handler.
        let output = match method {
            methods::INITIALIZE => dispatch::initialize::handle(id),
            methods::PROMPTS_LIST => dispatch::prompts_list::handle(id),
            methods::TOOLS_LIST => dispatch::tools_list::handle(id, self.registry.as_ref()),
            methods::TOOLS_CALL => {
                return dispatch::tools_call::handle(id, params, ctx, Arc::clone(&self.registry))
                    .await;
            }
            other => {
                warn!(method = other, "unknown MCP method");
                JsonRpcOutput::Error(JsonRpcErrorResponse::error(
                    id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {other}"),
                ))
            }
        };

        DispatchOutcome::Reply(output.to_json())
    }
}

/// Pulls the request id out of a raw envelope, defaulting to `null`.
fn extract_id(value: &Value) -> RequestId {
    value
        .get("id")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or(RequestId::Null)
}

fn reply_error(id: RequestId, code: i32, message: &str) -> DispatchOutcome {
    DispatchOutcome::Reply(JsonRpcOutput::Error(JsonRpcErrorResponse::error(id, code, message)).to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientHandle, ClientId};
    use crate::registry::{DeferredCompletions, StaticToolRegistry, ToolOutcome};
    use hashi_protocol::mcp::tools::ToolDefinition;
    use serde_json::json;

    fn test_ctx() -> ToolContext {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        ToolContext {
            client: ClientHandle {
                id: ClientId::new(1),
                addr: "127.0.0.1:1".parse().expect("addr"),
            },
            completions: DeferredCompletions { events: tx },
        }
    }

    fn dispatcher_with<F>(build: F) -> McpDispatcher
    where
        F: FnOnce(&mut StaticToolRegistry),
    {
        let mut registry = StaticToolRegistry::new();
        build(&mut registry);
        McpDispatcher::new(Arc::new(registry))
    }

    fn dispatcher() -> McpDispatcher {
        dispatcher_with(|_| {})
    }

    async fn reply_json(d: &McpDispatcher, raw: &str) -> Value {
        match d.dispatch(test_ctx(), raw).await {
            DispatchOutcome::Reply(s) => serde_json::from_str(&s).expect("valid reply"),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_yields_parse_error_with_null_id() {
        let reply = reply_json(&dispatcher(), "not json {").await;
        assert_eq!(reply["error"]["code"], -32700);
        assert!(reply["id"].is_null());
    }

    #[tokio::test]
    async fn non_object_yields_invalid_request() {
        let reply = reply_json(&dispatcher(), "[1,2,3]").await;
        assert_eq!(reply["error"]["code"], -32600);
    }

    #[tokio::test]
    async fn wrong_jsonrpc_version_yields_invalid_request_with_id() {
        let reply =
            reply_json(&dispatcher(), r#"{"jsonrpc":"1.0","id":5,"method":"x"}"#).await;
        assert_eq!(reply["error"]["code"], -32600);
        assert_eq!(reply["id"], 5);
    }

    #[tokio::test]
    async fn unknown_method_yields_method_not_found() {
        let reply =
            reply_json(&dispatcher(), r#"{"jsonrpc":"2.0","id":9,"method":"nope"}"#).await;
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["id"], 9);
    }

    #[tokio::test]
    async fn notification_is_silent() {
        let outcome = dispatcher()
            .dispatch(
                test_ctx(),
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            )
            .await;
        assert!(matches!(outcome, DispatchOutcome::Silent));
    }

    #[tokio::test]
    async fn unknown_notification_is_still_silent() {
        let outcome = dispatcher()
            .dispatch(test_ctx(), r#"{"jsonrpc":"2.0","method":"whatever"}"#)
            .await;
        assert!(matches!(outcome, DispatchOutcome::Silent));
    }

    #[tokio::test]
    async fn initialize_returns_capabilities() {
        let reply = reply_json(
            &dispatcher(),
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .await;
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(reply["result"]["capabilities"]["tools"]["listChanged"], true);
        assert_eq!(reply["result"]["serverInfo"]["name"], "hashi");
    }

    #[tokio::test]
    async fn prompts_list_returns_empty_array() {
        let reply = reply_json(
            &dispatcher(),
            r#"{"jsonrpc":"2.0","id":2,"method":"prompts/list"}"#,
        )
        .await;
        assert!(reply["result"]["prompts"].is_array());
        assert_eq!(reply["result"]["prompts"].as_array().expect("arr").len(), 0);
    }

    #[tokio::test]
    async fn tools_list_returns_registry_tools() {
        let d = dispatcher_with(|r| {
            r.register(
                ToolDefinition {
                    name: "openFile".into(),
                    description: Some("Open a file in the editor".into()),
                    input_schema: json!({"type": "object"}),
                },
                |_ctx, _args| async { ToolOutcome::Ok(json!({})) },
            );
        });
        let reply = reply_json(&d, r#"{"jsonrpc":"2.0","id":3,"method":"tools/list"}"#).await;
        let tools = reply["result"]["tools"].as_array().expect("arr");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "openFile");
    }

    #[tokio::test]
    async fn tools_call_immediate_result() {
        let d = dispatcher_with(|r| {
            r.register(
                ToolDefinition {
                    name: "echo".into(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                |_ctx, args| async move { ToolOutcome::Ok(json!({"content": [args]})) },
            );
        });
        let reply = reply_json(
            &d,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"echo","arguments":{"x":1}}}"#,
        )
        .await;
        assert_eq!(reply["id"], 4);
        assert_eq!(reply["result"]["content"][0]["x"], 1);
    }

    #[tokio::test]
    async fn tools_call_without_params_is_invalid() {
        let reply = reply_json(
            &dispatcher(),
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call"}"#,
        )
        .await;
        assert_eq!(reply["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn panicking_tool_yields_internal_error_with_detail() {
        let d = dispatcher_with(|r| {
            r.register(
                ToolDefinition {
                    name: "boom".into(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                |_ctx, _args| async { panic!("tool exploded") },
            );
        });
        let reply = reply_json(
            &d,
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"boom","arguments":{}}}"#,
        )
        .await;
        assert_eq!(reply["id"], 6);
        assert_eq!(reply["error"]["code"], -32603);
        assert_eq!(reply["error"]["message"], "Internal error");
        assert_eq!(reply["error"]["data"], "tool exploded");
    }

    #[tokio::test]
    async fn tools_call_deferred_produces_no_reply() {
        let d = dispatcher_with(|r| {
            r.register(
                ToolDefinition {
                    name: "confirm".into(),
                    description: None,
                    input_schema: json!({"type": "object"}),
                },
                |_ctx, _args| async { ToolOutcome::Deferred("tok-1".into()) },
            );
        });
        let outcome = d
            .dispatch(
                test_ctx(),
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"confirm","arguments":{}}}"#,
            )
            .await;
        match outcome {
            DispatchOutcome::Deferred { token, id } => {
                assert_eq!(token, "tok-1");
                assert_eq!(id, RequestId::Number(7));
            }
            other => panic!("expected deferred, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn string_id_echoed_back() {
        let reply = reply_json(
            &dispatcher(),
            r#"{"jsonrpc":"2.0","id":"abc","method":"prompts/list"}"#,
        )
        .await;
        assert_eq!(reply["id"], "abc");
    }
}
