//! # hashi-server
//!
//! The hashi endpoint core: a loopback WebSocket server that speaks
//! JSON-RPC 2.0 (MCP dialect) and dispatches tool invocations into an
//! injected registry. Covers the TCP listener and client registry, the
//! per-connection state machine, the JSON-RPC dispatcher with deferred
//! responses, and the keepalive supervisor.
//!
//! All connection state is owned by a single event-loop task; the
//! accept loop, socket readers, the keepalive ticker and deferred
//! completions communicate with it over one channel, so no state is
//! guarded by a lock and per-client ordering is total.

mod client;
mod clock;
mod dispatch;
mod error;
mod event;
mod handler;
mod hooks;
mod keepalive;
mod registry;
mod server;

pub use client::{ClientHandle, ClientId};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::ServerError;
pub use hooks::{EndpointHooks, NoopHooks};
pub use keepalive::DEFAULT_INTERVAL_MS;
pub use registry::{
    DeferredCompletions, StaticToolRegistry, ToolContext, ToolOutcome, ToolRegistry,
};
pub use server::{EndpointConfig, McpEndpoint};
