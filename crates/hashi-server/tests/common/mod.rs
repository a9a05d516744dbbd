//! Shared helpers for endpoint integration tests: a minimal WebSocket
//! client over a raw `TcpStream`, recording hooks, and a small tool
//! registry.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hashi_protocol::mcp::tools::ToolDefinition;
use hashi_server::{
    ClientHandle, ClientId, EndpointHooks, StaticToolRegistry, ToolOutcome,
};
use hashi_ws::frame::{encode_frame, parse_frame, Frame, Role};

pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Minimal WebSocket client used to drive the endpoint byte-by-byte.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    pub async fn connect(port: u16) -> Self {
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("connect to endpoint");
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    /// Performs the upgrade handshake and returns the HTTP response head.
    pub async fn handshake(&mut self, token: Option<&str>) -> String {
        let auth_line = token
            .map(|t| format!("X-Claude-Code-Ide-Authorization: {t}\r\n"))
            .unwrap_or_default();
        let request = format!(
            "GET / HTTP/1.1\r\n\
             Host: 127.0.0.1\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {SAMPLE_KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             {auth_line}\r\n"
        );
        self.stream
            .write_all(request.as_bytes())
            .await
            .expect("write handshake");

        self.read_until_header_end().await
    }

    async fn read_until_header_end(&mut self) -> String {
        let deadline = Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            loop {
                if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head: Vec<u8> = self.buf.drain(..pos + 4).collect();
                    return String::from_utf8(head).expect("utf8 response head");
                }
                let mut chunk = [0u8; 1024];
                let n = self.stream.read(&mut chunk).await.expect("read response");
                assert!(n > 0, "EOF before handshake response completed");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .expect("handshake response within deadline")
    }

    pub async fn send_frame(&mut self, frame: &Frame) {
        let bytes = encode_frame(frame, Role::Client).expect("encode frame");
        self.stream.write_all(&bytes).await.expect("write frame");
    }

    /// Sends raw pre-encoded bytes, bypassing the client codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.expect("write raw");
    }

    pub async fn send_text(&mut self, text: &str) {
        self.send_frame(&Frame::text(text.to_string())).await;
    }

    /// Receives the next frame from the endpoint.
    pub async fn recv_frame(&mut self) -> Frame {
        let deadline = Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            loop {
                if let Some((frame, consumed)) =
                    parse_frame(&self.buf, Role::Client).expect("valid server frame")
                {
                    self.buf.drain(..consumed);
                    return frame;
                }
                let mut chunk = [0u8; 4096];
                let n = self.stream.read(&mut chunk).await.expect("read frame");
                assert!(n > 0, "EOF while waiting for a frame");
                self.buf.extend_from_slice(&chunk[..n]);
            }
        })
        .await
        .expect("frame within deadline")
    }

    /// Sends a JSON-RPC request and parses the Text-frame response.
    pub async fn request(&mut self, body: Value) -> Value {
        self.send_text(&body.to_string()).await;
        let frame = self.recv_frame().await;
        serde_json::from_slice(&frame.payload).expect("valid JSON response")
    }

    /// True when the endpoint has closed the connection (EOF).
    pub async fn reads_eof(&mut self) -> bool {
        let deadline = Duration::from_secs(2);
        tokio::time::timeout(deadline, async {
            loop {
                let mut chunk = [0u8; 1024];
                match self.stream.read(&mut chunk).await {
                    Ok(0) => return true,
                    Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                    Err(_) => return true,
                }
            }
        })
        .await
        .unwrap_or(false)
    }
}

/// Lifecycle events captured by [`RecordingHooks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Connect(ClientId),
    Message(String),
    Disconnect(u16, String),
    Error(String),
}

/// Hooks implementation that records every event for assertions.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().expect("hooks lock").clone()
    }

    pub fn disconnects(&self) -> Vec<(u16, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Disconnect(code, reason) => Some((code, reason)),
                _ => None,
            })
            .collect()
    }

    pub fn connects(&self) -> Vec<ClientId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Connect(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

impl EndpointHooks for RecordingHooks {
    fn on_connect(&self, client: &ClientHandle) {
        self.events
            .lock()
            .expect("hooks lock")
            .push(HookEvent::Connect(client.id));
    }

    fn on_message(&self, _client: &ClientHandle, text: &str) {
        self.events
            .lock()
            .expect("hooks lock")
            .push(HookEvent::Message(text.to_string()));
    }

    fn on_disconnect(&self, _client: &ClientHandle, code: u16, reason: &str) {
        self.events
            .lock()
            .expect("hooks lock")
            .push(HookEvent::Disconnect(code, reason.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.events
            .lock()
            .expect("hooks lock")
            .push(HookEvent::Error(message.to_string()));
    }
}

/// Registry with an immediate `echo` tool and a deferred `confirm` tool.
pub fn sample_registry() -> StaticToolRegistry {
    let mut registry = StaticToolRegistry::new();
    registry.register(
        ToolDefinition {
            name: "echo".into(),
            description: Some("Echo the arguments back".into()),
            input_schema: json!({"type": "object"}),
        },
        |_ctx, args| async move {
            ToolOutcome::Ok(json!({
                "content": [{"type": "text", "text": args.to_string()}]
            }))
        },
    );
    registry.register(
        ToolDefinition {
            name: "confirm".into(),
            description: Some("Ask the user for confirmation".into()),
            input_schema: json!({"type": "object"}),
        },
        |_ctx, _args| async { ToolOutcome::Deferred("confirm-1".into()) },
    );
    registry.register(
        ToolDefinition {
            name: "boom".into(),
            description: Some("Always panics".into()),
            input_schema: json!({"type": "object"}),
        },
        |_ctx, _args| async { panic!("boom tool is broken") },
    );
    registry
}

/// Waits until `predicate` holds or the deadline elapses.
pub async fn wait_for<F>(mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = std::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        assert!(
            std::time::Instant::now() < deadline,
            "condition not reached within deadline"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
