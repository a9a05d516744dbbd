//! WebSocket frame codec according to RFC 6455.
//!
//! Parses frames out of a raw byte buffer and encodes outbound frames.
//! Masking rules are enforced by role: client-to-server frames must be
//! masked, server-to-client frames must not be. Reserved bits are
//! rejected (no extension support).

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// WebSocket frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation frame (fragmented message).
    Continuation = 0x0,
    /// Text data frame.
    Text = 0x1,
    /// Binary data frame.
    Binary = 0x2,
    /// Connection close control frame.
    Close = 0x8,
    /// Ping control frame.
    Ping = 0x9,
    /// Pong control frame.
    Pong = 0xA,
}

impl Opcode {
    /// Returns true if this is a control frame (Close, Ping, Pong).
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Try to parse an opcode from a byte value.
    pub fn from_u8(value: u8) -> Result<Self, FrameError> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(FrameError::InvalidOpcode(value)),
        }
    }
}

/// A decoded WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag (FIN bit).
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Unmasked payload data.
    pub payload: Bytes,
}

impl Frame {
    /// Create a text frame with the given payload.
    #[must_use]
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Text,
            payload: payload.into(),
        }
    }

    /// Create a binary frame with the given payload.
    #[must_use]
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Binary,
            payload: payload.into(),
        }
    }

    /// Create a ping frame with the given payload.
    #[must_use]
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Ping,
            payload: payload.into(),
        }
    }

    /// Create a pong frame with the given payload.
    #[must_use]
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self {
            fin: true,
            opcode: Opcode::Pong,
            payload: payload.into(),
        }
    }

    /// Create a close frame with an optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: Option<&str>) -> Self {
        let payload = match (code, reason) {
            (Some(c), Some(r)) => {
                let mut buf = BytesMut::with_capacity(2 + r.len());
                buf.put_u16(c);
                buf.put_slice(r.as_bytes());
                buf.freeze()
            }
            (Some(c), None) => {
                let mut buf = BytesMut::with_capacity(2);
                buf.put_u16(c);
                buf.freeze()
            }
            _ => Bytes::new(),
        };

        Self {
            fin: true,
            opcode: Opcode::Close,
            payload,
        }
    }
}

/// Frame codec errors. Any of these is a protocol violation; the
/// connection layer maps them to a 1002 close.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Reserved bits set without extension support.
    #[error("reserved bits set without extension")]
    ReservedBitsSet,
    /// Invalid opcode value.
    #[error("invalid opcode: 0x{0:X}")]
    InvalidOpcode(u8),
    /// Client frame is not masked (RFC 6455 section 5.1).
    #[error("client frame must be masked")]
    UnmaskedClientFrame,
    /// Server frame is masked.
    #[error("server frame must not be masked")]
    MaskedServerFrame,
    /// Control frame payload exceeds 125 bytes.
    #[error("control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),
    /// Control frame is fragmented (FIN not set).
    #[error("control frame cannot be fragmented")]
    FragmentedControlFrame,
}

/// Role in the WebSocket connection (affects masking requirements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Client role: masks outbound frames, expects unmasked inbound.
    Client,
    /// Server role: sends unmasked, requires masked inbound.
    Server,
}

/// Parse a single frame from the head of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame,
/// and `Ok(Some((frame, consumed)))` on success where `consumed` is the
/// total number of bytes (header plus payload) to drain from the buffer.
///
/// # Errors
///
/// Returns a `FrameError` on any protocol violation: reserved bits,
/// unknown opcode, masking rule violation for `role`, or an invalid
/// control frame.
pub fn parse_frame(buf: &[u8], role: Role) -> Result<Option<(Frame, usize)>, FrameError> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let first = buf[0];
    let second = buf[1];

    let fin = (first & 0x80) != 0;
    let rsv = first & 0x70;
    let opcode_raw = first & 0x0F;
    let masked = (second & 0x80) != 0;
    let len7 = second & 0x7F;

    if rsv != 0 {
        return Err(FrameError::ReservedBitsSet);
    }

    let opcode = Opcode::from_u8(opcode_raw)?;

    // Masking rules (RFC 6455 section 5.1):
    // client-to-server MUST be masked, server-to-client MUST NOT be.
    match role {
        Role::Server if !masked => return Err(FrameError::UnmaskedClientFrame),
        Role::Client if masked => return Err(FrameError::MaskedServerFrame),
        _ => {}
    }

    if opcode.is_control() {
        if !fin {
            return Err(FrameError::FragmentedControlFrame);
        }
        if len7 > 125 {
            return Err(FrameError::ControlFrameTooLarge(len7 as usize));
        }
    }

    // Header: 2 fixed bytes, then the extended length, then the mask key.
    let mut offset = 2usize;
    let payload_len: u64 = match len7 {
        126 => {
            if buf.len() < offset + 2 {
                return Ok(None);
            }
            let len = u64::from(u16::from_be_bytes([buf[offset], buf[offset + 1]]));
            offset += 2;
            len
        }
        127 => {
            if buf.len() < offset + 8 {
                return Ok(None);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[offset..offset + 8]);
            offset += 8;
            u64::from_be_bytes(bytes)
        }
        n => u64::from(n),
    };

    let mask_key = if masked {
        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let mut key = [0u8; 4];
        key.copy_from_slice(&buf[offset..offset + 4]);
        offset += 4;
        Some(key)
    } else {
        None
    };

    let payload_len = payload_len as usize;
    if buf.len() < offset + payload_len {
        return Ok(None);
    }

    let mut payload = buf[offset..offset + payload_len].to_vec();
    if let Some(key) = mask_key {
        apply_mask(&mut payload, key);
    }

    let frame = Frame {
        fin,
        opcode,
        payload: Bytes::from(payload),
    };

    Ok(Some((frame, offset + payload_len)))
}

/// Encode a frame for the wire.
///
/// Server-role frames are emitted unmasked; client-role frames get a
/// fresh random masking key. The shortest length encoding is used.
///
/// # Errors
///
/// Returns a `FrameError` for control frames that violate RFC 6455
/// (fragmented, or payload over 125 bytes).
pub fn encode_frame(frame: &Frame, role: Role) -> Result<BytesMut, FrameError> {
    let payload_len = frame.payload.len();

    if frame.opcode.is_control() {
        if !frame.fin {
            return Err(FrameError::FragmentedControlFrame);
        }
        if payload_len > 125 {
            return Err(FrameError::ControlFrameTooLarge(payload_len));
        }
    }

    let should_mask = role == Role::Client;

    let mut first = frame.opcode as u8;
    if frame.fin {
        first |= 0x80;
    }
    let mask_bit = if should_mask { 0x80 } else { 0 };

    let header_size = 2
        + if payload_len > 65535 {
            8
        } else if payload_len > 125 {
            2
        } else {
            0
        }
        + if should_mask { 4 } else { 0 };

    let mut dst = BytesMut::with_capacity(header_size + payload_len);
    dst.put_u8(first);

    if payload_len <= 125 {
        dst.put_u8(mask_bit | (payload_len as u8));
    } else if payload_len <= 65535 {
        dst.put_u8(mask_bit | 126);
        dst.put_u16(payload_len as u16);
    } else {
        dst.put_u8(mask_bit | 127);
        dst.put_u64(payload_len as u64);
    }

    if should_mask {
        let key: [u8; 4] = rand::random();
        dst.put_slice(&key);

        let mut masked = frame.payload.to_vec();
        apply_mask(&mut masked, key);
        dst.put_slice(&masked);
    } else {
        dst.put_slice(&frame.payload);
    }

    Ok(dst)
}

/// Apply XOR masking to payload data, in place.
///
/// XOR is its own inverse, so this both masks and unmasks.
pub fn apply_mask(payload: &mut [u8], mask_key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }
}
