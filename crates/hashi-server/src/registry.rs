//! Tool registry seam.
//!
//! The endpoint routes `tools/list` and `tools/call` into an injected
//! registry. A handler either answers immediately, fails, or defers:
//! deferred handlers park the request and resolve it later through a
//! [`DeferredCompletions`] handle (e.g. after a user confirms a dialog
//! in the editor).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use hashi_protocol::jsonrpc::{error_codes, JsonRpcError};
use hashi_protocol::mcp::tools::{ToolDefinition, ToolsCallParams};

use crate::client::ClientHandle;
use crate::event::ServerEvent;

/// Outcome of a tool invocation.
#[derive(Debug)]
pub enum ToolOutcome {
    /// The tool completed; the value becomes the JSON-RPC `result`.
    Ok(Value),
    /// The tool failed; the error becomes the JSON-RPC `error`.
    Err(JsonRpcError),
    /// The tool parked the request. The response is emitted when the
    /// token is resolved through [`DeferredCompletions`].
    Deferred(String),
}

/// Context handed to every tool invocation.
#[derive(Clone)]
pub struct ToolContext {
    /// The requesting client.
    pub client: ClientHandle,
    /// Handle for resolving deferred invocations.
    pub completions: DeferredCompletions,
}

/// Abstract registry of callable tools.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Tool definitions advertised via `tools/list`.
    fn list(&self) -> Vec<ToolDefinition>;

    /// Invokes a tool by name.
    async fn invoke(&self, ctx: ToolContext, params: ToolsCallParams) -> ToolOutcome;
}

/// Cloneable handle that resolves deferred tool invocations.
///
/// Resolution is routed through the endpoint's event loop; if the
/// requesting client disconnected in the meantime, or the endpoint has
/// stopped, the resolution is dropped silently.
#[derive(Clone)]
pub struct DeferredCompletions {
    pub(crate) events: tokio::sync::mpsc::UnboundedSender<ServerEvent>,
}

impl DeferredCompletions {
    /// Resolves the deferred request registered under `token`.
    pub fn resolve(&self, token: impl Into<String>, result: Result<Value, JsonRpcError>) {
        let _ = self.events.send(ServerEvent::ResolveDeferred {
            token: token.into(),
            result,
        });
    }
}

impl std::fmt::Debug for DeferredCompletions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredCompletions").finish_non_exhaustive()
    }
}

type BoxedHandler = Arc<
    dyn Fn(ToolContext, Value) -> Pin<Box<dyn Future<Output = ToolOutcome> + Send>> + Send + Sync,
>;

/// In-memory registry backed by a map of handler closures.
///
/// Used by the CLI and the test suites; editor integrations provide
/// their own `ToolRegistry` implementation.
#[derive(Default)]
pub struct StaticToolRegistry {
    tools: Vec<ToolDefinition>,
    handlers: HashMap<String, BoxedHandler>,
}

impl StaticToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool definition with its handler.
    pub fn register<F, Fut>(&mut self, definition: ToolDefinition, handler: F)
    where
        F: Fn(ToolContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutcome> + Send + 'static,
    {
        let name = definition.name.clone();
        self.tools.push(definition);
        self.handlers
            .insert(name, Arc::new(move |ctx, args| Box::pin(handler(ctx, args))));
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    fn list(&self) -> Vec<ToolDefinition> {
        self.tools.clone()
    }

    async fn invoke(&self, ctx: ToolContext, params: ToolsCallParams) -> ToolOutcome {
        match self.handlers.get(&params.name) {
            Some(handler) => handler(ctx, params.arguments).await,
            None => ToolOutcome::Err(JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("unknown tool: {}", params.name),
            )),
        }
    }
}

impl std::fmt::Debug for StaticToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticToolRegistry")
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}
