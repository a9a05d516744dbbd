//! Close-frame payload handling (RFC 6455 section 7).
//!
//! A close payload is empty, a bare big-endian u16 status code, or a
//! status code followed by UTF-8 reason text.

use bytes::{BufMut, Bytes, BytesMut};

/// Close status codes used by the endpoint.
pub mod close_codes {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Going away (server shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Unsupported data (e.g. fragmented messages).
    pub const UNSUPPORTED: u16 = 1003;
    /// Abnormal closure; never sent in a frame, used for local reporting.
    pub const ABNORMAL: u16 = 1006;
}

/// Parsed close frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosePayload {
    /// Close status code, when present.
    pub code: Option<u16>,
    /// Close reason text, when present.
    pub reason: Option<String>,
}

impl ClosePayload {
    /// Parse a close frame payload.
    ///
    /// The code is present only when the payload holds at least two
    /// bytes. Reason bytes that are not valid UTF-8 are replaced
    /// lossily rather than failing the connection.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Self {
        if payload.len() < 2 {
            return Self {
                code: None,
                reason: None,
            };
        }
        let code = u16::from_be_bytes([payload[0], payload[1]]);
        let reason = if payload.len() > 2 {
            Some(String::from_utf8_lossy(&payload[2..]).into_owned())
        } else {
            None
        };
        Self {
            code: Some(code),
            reason,
        }
    }

    /// The status code, defaulting to 1000 (normal closure) when absent.
    #[must_use]
    pub fn code_or_normal(&self) -> u16 {
        self.code.unwrap_or(close_codes::NORMAL)
    }

    /// Encode this payload for a close frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match (&self.code, &self.reason) {
            (None, _) => Bytes::new(),
            (Some(code), None) => Bytes::copy_from_slice(&code.to_be_bytes()),
            (Some(code), Some(reason)) => {
                let mut buf = BytesMut::with_capacity(2 + reason.len());
                buf.put_u16(*code);
                buf.put_slice(reason.as_bytes());
                buf.freeze()
            }
        }
    }
}
