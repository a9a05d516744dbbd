//! # hashi-ws
//!
//! WebSocket wire format for the hashi endpoint: RFC 6455 frame
//! parsing/encoding and the HTTP/1.1 upgrade handshake. No extensions,
//! no fragmentation, no TLS; exactly what a loopback tool client needs.

pub mod close;
pub mod frame;
pub mod handshake;

pub use close::{close_codes, ClosePayload};
pub use frame::{apply_mask, encode_frame, parse_frame, Frame, FrameError, Opcode, Role};
pub use handshake::{
    compute_accept_key, process_handshake, HandshakeError, HandshakeOutcome, AUTH_HEADER,
};
