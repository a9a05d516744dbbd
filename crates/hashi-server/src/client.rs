//! Per-client connection state machine.
//!
//! A connection runs a two-phase consumer over its input buffer: the
//! HTTP upgrade handshake first, then the frame loop. The state machine
//! performs no I/O itself; feeding it bytes yields a sequence of
//! [`ConnAction`]s that the endpoint's event loop executes, which keeps
//! every transition unit-testable.

use std::fmt;
use std::net::SocketAddr;

use bytes::BytesMut;

use hashi_ws::close::{close_codes, ClosePayload};
use hashi_ws::frame::{parse_frame, Frame, Opcode, Role};
use hashi_ws::handshake::{process_handshake, HandshakeOutcome};

/// Opaque client identifier, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Cheap, cloneable reference to a client, handed to hooks and tools.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// The client's identifier.
    pub id: ClientId,
    /// The client's socket address (always loopback).
    pub addr: SocketAddr,
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientState {
    /// Accepted; handshake not yet complete.
    Connecting,
    /// Handshake done; frames flow.
    Connected,
    /// A close was initiated (by either side); no further sends.
    Closing,
}

/// Action requested by the state machine, executed by the event loop.
#[derive(Debug)]
pub(crate) enum ConnAction {
    /// Write raw bytes (the HTTP handshake response).
    SendRaw(Vec<u8>),
    /// Write an encoded frame.
    SendFrame(Frame),
    /// Deliver a Text/Binary payload to the dispatcher.
    Deliver(String),
    /// Surface an error to the host.
    Error(String),
    /// Terminal: retire the client through the disconnect path.
    Drop { code: u16, reason: String },
}

/// Protocol state for one client. Socket halves live in the event loop.
pub(crate) struct Connection {
    pub(crate) handle: ClientHandle,
    pub(crate) state: ClientState,
    pub(crate) in_buffer: BytesMut,
    pub(crate) handshake_done: bool,
    pub(crate) last_ping_sent: u64,
    pub(crate) last_pong_recv: u64,
}

impl Connection {
    pub(crate) fn new(handle: ClientHandle, now_ms: u64) -> Self {
        Self {
            handle,
            state: ClientState::Connecting,
            in_buffer: BytesMut::new(),
            handshake_done: false,
            last_ping_sent: 0,
            last_pong_recv: now_ms,
        }
    }

    /// True when outbound application sends are allowed.
    pub(crate) fn can_send(&self) -> bool {
        self.state == ClientState::Connected
    }

    /// Marks a server-initiated close. Returns the close frame to send,
    /// or `None` when the close is a no-op (already closing, or the
    /// handshake never completed so there is no framed channel).
    pub(crate) fn begin_close(&mut self, code: u16, reason: &str) -> Option<Frame> {
        if self.state == ClientState::Closing {
            return None;
        }
        let framed = self.handshake_done;
        self.state = ClientState::Closing;
        framed.then(|| Frame::close(Some(code), Some(reason)))
    }

    /// Feeds received bytes through the two-phase consumer.
    pub(crate) fn feed(
        &mut self,
        data: &[u8],
        auth_token: Option<&str>,
        now_ms: u64,
    ) -> Vec<ConnAction> {
        let mut actions = Vec::new();

        if self.state == ClientState::Closing {
            return actions;
        }

        self.in_buffer.extend_from_slice(data);

        // Phase A: the upgrade request.
        if !self.handshake_done {
            match process_handshake(&self.in_buffer, auth_token) {
                HandshakeOutcome::Pending => return actions,
                HandshakeOutcome::Complete {
                    response,
                    result,
                    remaining,
                } => {
                    actions.push(ConnAction::SendRaw(response));
                    match result {
                        Ok(()) => {
                            self.handshake_done = true;
                            self.state = ClientState::Connected;
                            self.last_pong_recv = now_ms;
                            self.in_buffer = BytesMut::from(remaining.as_slice());
                        }
                        Err(e) => {
                            let reason = format!("Handshake failed: {e}");
                            actions.push(ConnAction::Error(reason.clone()));
                            actions.push(ConnAction::Drop {
                                code: close_codes::ABNORMAL,
                                reason,
                            });
                            self.state = ClientState::Closing;
                            return actions;
                        }
                    }
                }
            }
        }

        // Phase B: the frame loop.
        while self.state == ClientState::Connected && self.in_buffer.len() >= 2 {
            match parse_frame(&self.in_buffer, Role::Server) {
                Ok(None) => break,
                Ok(Some((frame, consumed))) => {
                    let _ = self.in_buffer.split_to(consumed);
                    self.on_frame(frame, now_ms, &mut actions);
                }
                Err(e) => {
                    let reason = format!("Invalid frame: {e}");
                    actions.push(ConnAction::Error(reason.clone()));
                    actions.push(ConnAction::SendFrame(Frame::close(
                        Some(close_codes::PROTOCOL_ERROR),
                        Some("Protocol error"),
                    )));
                    actions.push(ConnAction::Drop {
                        code: close_codes::ABNORMAL,
                        reason,
                    });
                    self.state = ClientState::Closing;
                    break;
                }
            }
        }

        actions
    }

    fn on_frame(&mut self, frame: Frame, now_ms: u64, actions: &mut Vec<ConnAction>) {
        match frame.opcode {
            Opcode::Text | Opcode::Binary => {
                // Binary carries the same JSON payload as Text.
                actions.push(ConnAction::Deliver(
                    String::from_utf8_lossy(&frame.payload).into_owned(),
                ));
            }
            Opcode::Close => {
                let close = ClosePayload::parse(&frame.payload);
                actions.push(ConnAction::SendFrame(Frame::close(
                    close.code,
                    close.reason.as_deref(),
                )));
                self.state = ClientState::Closing;
                actions.push(ConnAction::Drop {
                    code: close.code_or_normal(),
                    reason: close.reason.unwrap_or_default(),
                });
            }
            Opcode::Ping => {
                actions.push(ConnAction::SendFrame(Frame::pong(frame.payload)));
            }
            Opcode::Pong => {
                self.last_pong_recv = now_ms;
            }
            Opcode::Continuation => {
                let reason = "Fragmented messages not supported".to_string();
                actions.push(ConnAction::Error(reason.clone()));
                actions.push(ConnAction::SendFrame(Frame::close(
                    Some(close_codes::UNSUPPORTED),
                    Some("Unsupported data"),
                )));
                actions.push(ConnAction::Drop {
                    code: close_codes::ABNORMAL,
                    reason,
                });
                self.state = ClientState::Closing;
            }
        }
    }
}
