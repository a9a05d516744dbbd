//! TCP listener, client registry and the endpoint event loop.
//!
//! One actor task owns every connection and is the sole mutator of the
//! client table and the deferred-response table. The accept loop,
//! per-client read tasks, the keepalive ticker and deferred-completion
//! handles communicate with it exclusively through the event channel,
//! which serializes all mutation without locks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rand::seq::SliceRandom;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hashi_protocol::jsonrpc::{
    JsonRpcErrorResponse, JsonRpcNotification, JsonRpcResponse, RequestId,
};
use hashi_ws::close::close_codes;
use hashi_ws::frame::{encode_frame, Frame, Role};

use crate::client::{ClientHandle, ClientId, ConnAction, Connection};
use crate::clock::{Clock, MonotonicClock};
use crate::error::ServerError;
use crate::event::ServerEvent;
use crate::handler::{DispatchOutcome, McpDispatcher};
use crate::hooks::{EndpointHooks, NoopHooks};
use crate::keepalive::{self, TickAction, DEFAULT_INTERVAL_MS, PING_PAYLOAD};
use crate::registry::{DeferredCompletions, ToolContext, ToolRegistry};

/// Endpoint configuration.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Lower bound of the listen port range (inclusive).
    pub port_min: u16,
    /// Upper bound of the listen port range (inclusive).
    pub port_max: u16,
    /// Pre-shared token required in the handshake's authorization
    /// header. `None` accepts any local client.
    pub auth_token: Option<String>,
    /// Keepalive ping interval in milliseconds.
    pub keepalive_interval_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            port_min: 10800,
            port_max: 10899,
            auth_token: None,
            keepalive_interval_ms: DEFAULT_INTERVAL_MS,
        }
    }
}

/// The in-editor MCP endpoint.
///
/// Listens on a loopback port, speaks RFC 6455 + JSON-RPC 2.0, and
/// dispatches tool invocations into the injected [`ToolRegistry`].
pub struct McpEndpoint {
    config: EndpointConfig,
    registry: Arc<dyn ToolRegistry>,
    hooks: Arc<dyn EndpointHooks>,
    clock: Arc<dyn Clock>,
    running: Option<Running>,
}

struct Running {
    port: u16,
    events: mpsc::UnboundedSender<ServerEvent>,
    actor: JoinHandle<()>,
    accept: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl McpEndpoint {
    /// Creates a stopped endpoint with no-op hooks and the system clock.
    pub fn new(config: EndpointConfig, registry: Arc<dyn ToolRegistry>) -> Self {
        Self {
            config,
            registry,
            hooks: Arc::new(NoopHooks),
            clock: Arc::new(MonotonicClock::new()),
            running: None,
        }
    }

    /// Replaces the lifecycle hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn EndpointHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces the clock (tests inject a manual clock).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The bound port, when running.
    pub fn port(&self) -> Option<u16> {
        self.running.as_ref().map(|r| r.port)
    }

    /// Binds a port from the configured range and starts serving.
    ///
    /// Ports are tried in a random permutation of the range; the first
    /// successful loopback bind wins.
    ///
    /// # Errors
    ///
    /// `AlreadyRunning` if the endpoint is running, `InvalidPortRange`
    /// for an empty range, `NoAvailablePort` when every port is taken.
    pub async fn start(&mut self) -> Result<u16, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        let (min, max) = (self.config.port_min, self.config.port_max);
        if min > max {
            return Err(ServerError::InvalidPortRange { min, max });
        }

        let (listener, port) = bind_in_range(min, max).await?;

        if self.config.auth_token.is_none() {
            warn!("no auth token configured; accepting any local client");
        }

        let (events, rx) = mpsc::unbounded_channel();

        let actor = Actor {
            auth_token: self.config.auth_token.clone(),
            interval_ms: self.config.keepalive_interval_ms,
            clock: Arc::clone(&self.clock),
            hooks: Arc::clone(&self.hooks),
            dispatcher: McpDispatcher::new(Arc::clone(&self.registry)),
            events_tx: events.clone(),
            clients: HashMap::new(),
            deferred: HashMap::new(),
            next_client: 0,
            last_tick: 0,
        };
        let actor = tokio::spawn(actor.run(rx));

        let accept = tokio::spawn(accept_loop(listener, events.clone()));
        let ticker = tokio::spawn(keepalive_ticker(
            self.config.keepalive_interval_ms,
            events.clone(),
        ));

        info!(port, "MCP endpoint listening on 127.0.0.1");

        self.running = Some(Running {
            port,
            events,
            actor,
            accept,
            ticker,
        });
        Ok(port)
    }

    /// Stops the endpoint: every client receives close 1001 and exactly
    /// one disconnect notification, the deferred table is cleared, and
    /// the listener is released.
    ///
    /// # Errors
    ///
    /// `NotRunning` if the endpoint is not running.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let Some(mut running) = self.running.take() else {
            return Err(ServerError::NotRunning);
        };

        running.accept.abort();
        running.ticker.abort();

        let (done_tx, done_rx) = oneshot::channel();
        if running
            .events
            .send(ServerEvent::Shutdown { done: done_tx })
            .is_ok()
        {
            let _ = done_rx.await;
        }
        let _ = (&mut running.actor).await;

        info!("MCP endpoint stopped");
        Ok(())
    }

    /// Sends a JSON-RPC notification to one client.
    ///
    /// # Errors
    ///
    /// `NotRunning` when the endpoint is stopped. A client that is not
    /// connected is reported through `on_error`.
    pub fn notify(
        &self,
        client: ClientId,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<(), ServerError> {
        self.send_event(ServerEvent::Notify {
            id: client,
            method: method.into(),
            params,
        })
    }

    /// Sends a JSON-RPC notification to every connected client.
    ///
    /// # Errors
    ///
    /// `NotRunning` when the endpoint is stopped.
    pub fn broadcast(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
    ) -> Result<(), ServerError> {
        self.send_event(ServerEvent::Broadcast {
            method: method.into(),
            params,
        })
    }

    /// Handle for resolving deferred tool invocations.
    ///
    /// # Errors
    ///
    /// `NotRunning` when the endpoint is stopped.
    pub fn deferred(&self) -> Result<DeferredCompletions, ServerError> {
        let running = self.running.as_ref().ok_or(ServerError::NotRunning)?;
        Ok(DeferredCompletions {
            events: running.events.clone(),
        })
    }

    fn send_event(&self, event: ServerEvent) -> Result<(), ServerError> {
        let running = self.running.as_ref().ok_or(ServerError::NotRunning)?;
        running.events.send(event).map_err(|_| ServerError::NotRunning)
    }
}

/// Try ports from the range in random order until one binds.
async fn bind_in_range(min: u16, max: u16) -> Result<(TcpListener, u16), ServerError> {
    let mut ports: Vec<u16> = (min..=max).collect();
    ports.shuffle(&mut rand::thread_rng());

    for port in ports {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(e) => debug!(port, error = %e, "port unavailable"),
        }
    }
    Err(ServerError::NoAvailablePort { min, max })
}

async fn accept_loop(listener: TcpListener, events: mpsc::UnboundedSender<ServerEvent>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if events.send(ServerEvent::Accepted { stream, addr }).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn keepalive_ticker(interval_ms: u64, events: mpsc::UnboundedSender<ServerEvent>) {
    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
    // The first tick completes immediately; skip it.
    interval.tick().await;
    loop {
        interval.tick().await;
        if events.send(ServerEvent::KeepaliveTick).is_err() {
            break;
        }
    }
}

fn spawn_reader(
    id: ClientId,
    mut read_half: OwnedReadHalf,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => {
                    let _ = events.send(ServerEvent::Eof { id });
                    break;
                }
                Ok(n) => {
                    let bytes = Bytes::copy_from_slice(&buf[..n]);
                    if events.send(ServerEvent::Data { id, bytes }).is_err() {
                        break;
                    }
                }
                Err(error) => {
                    let _ = events.send(ServerEvent::ReadError { id, error });
                    break;
                }
            }
        }
    })
}

struct ClientEntry {
    conn: Connection,
    writer: OwnedWriteHalf,
    read_task: JoinHandle<()>,
}

struct PendingRequest {
    client: ClientId,
    id: RequestId,
}

struct Actor {
    auth_token: Option<String>,
    interval_ms: u64,
    clock: Arc<dyn Clock>,
    hooks: Arc<dyn EndpointHooks>,
    dispatcher: McpDispatcher,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    clients: HashMap<ClientId, ClientEntry>,
    deferred: HashMap<String, PendingRequest>,
    next_client: u64,
    last_tick: u64,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ServerEvent>) {
        self.last_tick = self.clock.monotonic_ms();

        while let Some(event) = rx.recv().await {
            match event {
                ServerEvent::Accepted { stream, addr } => self.on_accepted(stream, addr),
                ServerEvent::Data { id, bytes } => self.on_data(id, &bytes).await,
                ServerEvent::Eof { id } => {
                    self.disconnect(id, close_codes::ABNORMAL, "EOF").await;
                }
                ServerEvent::ReadError { id, error } => {
                    let message = format!("Client read error: {error}");
                    self.hooks.on_error(&message);
                    self.disconnect(id, close_codes::ABNORMAL, &message).await;
                }
                ServerEvent::KeepaliveTick => self.on_tick().await,
                ServerEvent::Notify { id, method, params } => {
                    self.send_notification(id, &method, params).await;
                }
                ServerEvent::Broadcast { method, params } => {
                    let ids: Vec<ClientId> = self
                        .clients
                        .iter()
                        .filter(|(_, e)| e.conn.can_send())
                        .map(|(id, _)| *id)
                        .collect();
                    for id in ids {
                        self.send_notification(id, &method, params.clone()).await;
                    }
                }
                ServerEvent::ResolveDeferred { token, result } => {
                    self.on_resolve(&token, result).await;
                }
                ServerEvent::Shutdown { done } => {
                    self.on_shutdown().await;
                    let _ = done.send(());
                    break;
                }
            }
        }
    }

    fn on_accepted(&mut self, stream: TcpStream, addr: SocketAddr) {
        let id = ClientId::new(self.next_client);
        self.next_client += 1;

        let (read_half, write_half) = stream.into_split();
        let handle = ClientHandle { id, addr };
        let read_task = spawn_reader(id, read_half, self.events_tx.clone());
        let conn = Connection::new(handle.clone(), self.clock.monotonic_ms());

        self.clients.insert(
            id,
            ClientEntry {
                conn,
                writer: write_half,
                read_task,
            },
        );

        debug!(client_id = %id, %addr, "client connected");
        self.hooks.on_connect(&handle);
    }

    async fn on_data(&mut self, id: ClientId, bytes: &[u8]) {
        let now = self.clock.monotonic_ms();
        let Some(entry) = self.clients.get_mut(&id) else {
            return;
        };
        let actions = entry.conn.feed(bytes, self.auth_token.as_deref(), now);
        self.run_actions(id, actions).await;
    }

    async fn run_actions(&mut self, id: ClientId, actions: Vec<ConnAction>) {
        for action in actions {
            match action {
                ConnAction::SendRaw(bytes) => {
                    if !self.write_raw(id, &bytes).await {
                        return;
                    }
                }
                ConnAction::SendFrame(frame) => {
                    if !self.write_frame(id, &frame).await {
                        return;
                    }
                }
                ConnAction::Deliver(text) => self.deliver(id, text).await,
                ConnAction::Error(message) => self.hooks.on_error(&message),
                ConnAction::Drop { code, reason } => {
                    self.disconnect(id, code, &reason).await;
                    return;
                }
            }
        }
    }

    /// Routes one Text/Binary payload into the dispatcher.
    async fn deliver(&mut self, id: ClientId, text: String) {
        let Some(entry) = self.clients.get(&id) else {
            return;
        };
        let handle = entry.conn.handle.clone();
        self.hooks.on_message(&handle, &text);

        let ctx = ToolContext {
            client: handle,
            completions: DeferredCompletions {
                events: self.events_tx.clone(),
            },
        };

        match self.dispatcher.dispatch(ctx, &text).await {
            DispatchOutcome::Reply(json) => {
                self.send_text(id, &json).await;
            }
            DispatchOutcome::Deferred { token, id: request_id } => {
                let pending = PendingRequest {
                    client: id,
                    id: request_id,
                };
                if self.deferred.insert(token.clone(), pending).is_some() {
                    warn!(%token, "deferred token reused; dropping previous pending request");
                }
            }
            DispatchOutcome::Silent => {}
        }
    }

    async fn on_resolve(
        &mut self,
        token: &str,
        result: Result<Value, hashi_protocol::jsonrpc::JsonRpcError>,
    ) {
        let Some(pending) = self.deferred.remove(token) else {
            debug!(token, "no pending request for token");
            return;
        };
        if !self.clients.contains_key(&pending.client) {
            debug!(client_id = %pending.client, "client gone; dropping deferred response");
            return;
        }

        let output = match result {
            Ok(value) => serde_json::to_string(&JsonRpcResponse::success(pending.id, value)),
            Err(error) => serde_json::to_string(&JsonRpcErrorResponse {
                jsonrpc: "2.0".to_string(),
                id: pending.id,
                error,
            }),
        };
        match output {
            Ok(json) => {
                self.send_text(pending.client, &json).await;
            }
            Err(e) => warn!(error = %e, "failed to serialize deferred response"),
        }
    }

    async fn on_tick(&mut self) {
        let now = self.clock.monotonic_ms();

        if keepalive::clock_jumped(now, self.last_tick, self.interval_ms) {
            info!("clock jump detected; granting keepalive grace window");
            for entry in self.clients.values_mut() {
                if entry.conn.can_send() {
                    entry.conn.last_pong_recv = now;
                }
            }
        }

        let decisions: Vec<(ClientId, TickAction)> = self
            .clients
            .iter()
            .filter(|(_, e)| e.conn.can_send())
            .map(|(id, e)| {
                (
                    *id,
                    keepalive::tick_action(now, e.conn.last_pong_recv, self.interval_ms),
                )
            })
            .collect();

        for (id, action) in decisions {
            match action {
                TickAction::Ping => {
                    let ping = Frame::ping(Bytes::from_static(PING_PAYLOAD));
                    if self.write_frame(id, &ping).await {
                        if let Some(entry) = self.clients.get_mut(&id) {
                            entry.conn.last_ping_sent = now;
                        }
                    }
                }
                TickAction::Timeout => {
                    info!(client_id = %id, "connection timeout");
                    self.disconnect(id, close_codes::ABNORMAL, "Connection timeout")
                        .await;
                }
            }
        }

        self.last_tick = now;
    }

    async fn send_notification(&mut self, id: ClientId, method: &str, params: Option<Value>) {
        let connected = self
            .clients
            .get(&id)
            .map(|e| e.conn.can_send())
            .unwrap_or(false);
        if !connected {
            self.hooks
                .on_error(&format!("Cannot send to {id}: not connected"));
            return;
        }

        let notification = JsonRpcNotification::new(method, params);
        match serde_json::to_string(&notification) {
            Ok(json) => {
                self.send_text(id, &json).await;
            }
            Err(e) => warn!(error = %e, "failed to serialize notification"),
        }
    }

    /// Sends a Text frame; requires the client to be connected.
    async fn send_text(&mut self, id: ClientId, json: &str) -> bool {
        let connected = self
            .clients
            .get(&id)
            .map(|e| e.conn.can_send())
            .unwrap_or(false);
        if !connected {
            debug!(client_id = %id, "dropping outbound message: not connected");
            return false;
        }
        self.write_frame(id, &Frame::text(json.as_bytes().to_vec()))
            .await
    }

    async fn write_frame(&mut self, id: ClientId, frame: &Frame) -> bool {
        match encode_frame(frame, Role::Server) {
            Ok(bytes) => self.write_raw(id, &bytes).await,
            Err(e) => {
                warn!(error = %e, "failed to encode frame");
                false
            }
        }
    }

    async fn write_raw(&mut self, id: ClientId, bytes: &[u8]) -> bool {
        let Some(entry) = self.clients.get_mut(&id) else {
            return false;
        };
        if let Err(e) = entry.writer.write_all(bytes).await {
            let message = format!("Client write error: {e}");
            self.hooks.on_error(&message);
            self.disconnect(id, close_codes::ABNORMAL, &message).await;
            return false;
        }
        true
    }

    /// The only path by which a client leaves the registry.
    ///
    /// Idempotent: a client already removed is ignored, so multi-path
    /// terminations (peer close then EOF, error then reset) emit exactly
    /// one `on_disconnect`.
    async fn disconnect(&mut self, id: ClientId, code: u16, reason: &str) {
        let Some(mut entry) = self.clients.remove(&id) else {
            return;
        };

        debug!(client_id = %id, code, reason, "client disconnected");
        self.hooks.on_disconnect(&entry.conn.handle, code, reason);

        entry.read_task.abort();
        let _ = entry.writer.shutdown().await;
    }

    async fn on_shutdown(&mut self) {
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            if let Some(entry) = self.clients.get_mut(&id) {
                if let Some(frame) =
                    entry.conn.begin_close(close_codes::GOING_AWAY, "Server shutting down")
                {
                    if let Ok(bytes) = encode_frame(&frame, Role::Server) {
                        let _ = entry.writer.write_all(&bytes).await;
                    }
                }
            }
            self.disconnect(id, close_codes::GOING_AWAY, "Server shutting down")
                .await;
        }
        self.deferred.clear();
    }
}
