//! `hashi serve` command.
//!
//! Starts the MCP endpoint on a loopback port and serves until ctrl-c,
//! then closes every client with 1001 "Server shutting down". The
//! standalone binary registers a demo `echo` tool; editor embeddings
//! inject their own registry instead.

use std::sync::Arc;

use clap::Args;
use serde_json::json;

use hashi_config::load_config;
use hashi_protocol::mcp::tools::ToolDefinition;
use hashi_server::{EndpointConfig, McpEndpoint, StaticToolRegistry, ToolOutcome};

/// Start the MCP endpoint.
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Lower bound of the listen port range (overrides config).
    #[arg(long)]
    pub port_min: Option<u16>,
    /// Upper bound of the listen port range (overrides config).
    #[arg(long)]
    pub port_max: Option<u16>,
    /// Pre-shared auth token (overrides config).
    #[arg(long)]
    pub token: Option<String>,
    /// Keepalive ping interval in milliseconds (overrides config).
    #[arg(long)]
    pub interval_ms: Option<u64>,
}

/// Executes the serve command.
pub async fn execute(args: &ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path).map_err(|e| anyhow::anyhow!("config error: {e}"))?;

    let endpoint_config = EndpointConfig {
        port_min: args.port_min.unwrap_or(config.server.port_min),
        port_max: args.port_max.unwrap_or(config.server.port_max),
        auth_token: args.token.clone().or(config.server.auth_token),
        keepalive_interval_ms: args.interval_ms.unwrap_or(config.keepalive.interval_ms),
    };

    let mut endpoint = McpEndpoint::new(endpoint_config, Arc::new(demo_registry()));

    let port = endpoint
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("startup error: {e}"))?;

    tracing::info!(port, "hashi MCP endpoint ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    endpoint
        .stop()
        .await
        .map_err(|e| anyhow::anyhow!("shutdown error: {e}"))?;

    Ok(())
}

/// Registry used by the standalone binary: a single `echo` tool.
pub(crate) fn demo_registry() -> StaticToolRegistry {
    let mut registry = StaticToolRegistry::new();
    registry.register(
        ToolDefinition {
            name: "echo".into(),
            description: Some("Echo the arguments back as text content".into()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string", "description": "Text to echo"}
                }
            }),
        },
        |_ctx, arguments| async move {
            ToolOutcome::Ok(json!({
                "content": [{"type": "text", "text": arguments.to_string()}],
                "isError": false
            }))
        },
    );
    registry
}
