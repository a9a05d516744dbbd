//! Internal event set for the endpoint's single-consumer loop.
//!
//! The accept loop, per-client read tasks, the keepalive ticker, and
//! deferred-completion handles all feed this channel; one actor task
//! consumes it and is the sole mutator of connection state.

use bytes::Bytes;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use hashi_protocol::jsonrpc::JsonRpcError;

use crate::client::ClientId;

pub(crate) enum ServerEvent {
    /// A new TCP connection was accepted.
    Accepted {
        stream: TcpStream,
        addr: std::net::SocketAddr,
    },
    /// Bytes arrived from a client socket.
    Data { id: ClientId, bytes: Bytes },
    /// The client socket reached EOF.
    Eof { id: ClientId },
    /// Reading from the client socket failed.
    ReadError { id: ClientId, error: std::io::Error },
    /// The keepalive ticker fired.
    KeepaliveTick,
    /// Send a notification to one client.
    Notify {
        id: ClientId,
        method: String,
        params: Option<Value>,
    },
    /// Send a notification to every connected client.
    Broadcast {
        method: String,
        params: Option<Value>,
    },
    /// A deferred tool invocation completed.
    ResolveDeferred {
        token: String,
        result: Result<Value, JsonRpcError>,
    },
    /// Stop the endpoint; acknowledged once every client is retired.
    Shutdown { done: oneshot::Sender<()> },
}
