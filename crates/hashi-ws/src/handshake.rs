//! WebSocket upgrade handshake (RFC 6455 section 4).
//!
//! Processes the single HTTP/1.1 request a client sends before the
//! connection switches to framed mode, including the endpoint's
//! pre-shared-token authorization header.

use base64::Engine;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use thiserror::Error;

/// RFC 6455 GUID for the Sec-WebSocket-Accept calculation.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Authorization header carrying the pre-shared token.
pub const AUTH_HEADER: &str = "x-claude-code-ide-authorization";

/// Compute the Sec-WebSocket-Accept value from a client key.
///
/// Per RFC 6455 section 4.2.2: SHA-1 over the key concatenated with the
/// GUID, base64-encoded.
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Handshake validation errors.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Malformed or non-upgrade HTTP request.
    #[error("invalid HTTP request: {0}")]
    InvalidRequest(String),
    /// A required header is absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),
    /// Sec-WebSocket-Version is not 13.
    #[error("unsupported WebSocket version: {0}")]
    UnsupportedVersion(String),
    /// Sec-WebSocket-Key is not base64 of 16 bytes.
    #[error("invalid Sec-WebSocket-Key")]
    InvalidKey,
    /// Authorization token missing or mismatched.
    #[error("unauthorized")]
    Unauthorized,
}

/// Result of feeding buffered bytes to the handshake processor.
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// The request terminator has not arrived yet; keep buffering.
    Pending,
    /// A complete request was processed.
    Complete {
        /// HTTP response to flush to the peer (101, 400 or 401).
        response: Vec<u8>,
        /// `Ok` when the upgrade was accepted.
        result: Result<(), HandshakeError>,
        /// Bytes that arrived after the request terminator; the first
        /// frames of the WebSocket stream.
        remaining: Vec<u8>,
    },
}

/// Process one buffered HTTP/1.1 upgrade request.
///
/// Returns [`HandshakeOutcome::Pending`] until `\r\n\r\n` is seen. Once a
/// full request is buffered it is validated in order (request line,
/// Upgrade, Connection, version, key, authorization); the first failure
/// short-circuits into a 400 or 401 response.
#[must_use]
pub fn process_handshake(buf: &[u8], auth_token: Option<&str>) -> HandshakeOutcome {
    let Some(header_end) = find_terminator(buf) else {
        return HandshakeOutcome::Pending;
    };

    let head = &buf[..header_end];
    let remaining = buf[header_end..].to_vec();

    let result = validate_request(head, auth_token);
    let response = match &result {
        Ok(accept_key) => accept_response(accept_key),
        Err(e) => reject_response(e),
    };

    HandshakeOutcome::Complete {
        response,
        result: result.map(|_| ()),
        remaining,
    }
}

/// Position just past the `\r\n\r\n` request terminator, if present.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn validate_request(head: &[u8], auth_token: Option<&str>) -> Result<String, HandshakeError> {
    let request = HttpRequest::parse(head)?;

    // 1. Request line.
    if request.method != "GET" {
        return Err(HandshakeError::InvalidRequest(format!(
            "method must be GET, got '{}'",
            request.method
        )));
    }
    if request.version != "HTTP/1.1" {
        return Err(HandshakeError::InvalidRequest(format!(
            "version must be HTTP/1.1, got '{}'",
            request.version
        )));
    }

    // 2. Upgrade header.
    let upgrade = request
        .header("upgrade")
        .ok_or(HandshakeError::MissingHeader("Upgrade"))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(HandshakeError::InvalidRequest(format!(
            "Upgrade header must be 'websocket', got '{upgrade}'"
        )));
    }

    // 3. Connection header must contain the Upgrade token.
    let connection = request
        .header("connection")
        .ok_or(HandshakeError::MissingHeader("Connection"))?;
    if !connection
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(HandshakeError::InvalidRequest(format!(
            "Connection header must contain 'Upgrade', got '{connection}'"
        )));
    }

    // 4. WebSocket version.
    let version = request
        .header("sec-websocket-version")
        .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Version"))?;
    if version != "13" {
        return Err(HandshakeError::UnsupportedVersion(version.to_string()));
    }

    // 5. Client key: base64 of 16 raw bytes.
    let client_key = request
        .header("sec-websocket-key")
        .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Key"))?;
    match base64::engine::general_purpose::STANDARD.decode(client_key) {
        Ok(decoded) if decoded.len() == 16 => {}
        _ => return Err(HandshakeError::InvalidKey),
    }

    // 6. Pre-shared token, byte-for-byte.
    if let Some(expected) = auth_token {
        match request.header(AUTH_HEADER) {
            Some(provided) if provided == expected => {}
            _ => return Err(HandshakeError::Unauthorized),
        }
    }

    Ok(compute_accept_key(client_key))
}

/// Build the 101 Switching Protocols response.
fn accept_response(accept_key: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         \r\n"
    )
    .into_bytes()
}

/// Build a 400 or 401 rejection response with a plain-text body.
fn reject_response(error: &HandshakeError) -> Vec<u8> {
    let (status, phrase) = match error {
        HandshakeError::Unauthorized => (401, "Unauthorized"),
        _ => (400, "Bad Request"),
    };
    let body = error.to_string();
    format!(
        "HTTP/1.1 {status} {phrase}\r\n\
         Content-Type: text/plain\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    )
    .into_bytes()
}

/// Minimal HTTP request representation for the handshake.
#[derive(Debug, Clone)]
struct HttpRequest {
    method: String,
    version: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    fn parse(data: &[u8]) -> Result<Self, HandshakeError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| HandshakeError::InvalidRequest("invalid UTF-8".into()))?;

        let mut lines = text.lines();

        let request_line = lines
            .next()
            .ok_or_else(|| HandshakeError::InvalidRequest("empty request".into()))?;

        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| HandshakeError::InvalidRequest("missing method".into()))?
            .to_string();
        let _path = parts
            .next()
            .ok_or_else(|| HandshakeError::InvalidRequest("missing path".into()))?;
        let version = parts
            .next()
            .ok_or_else(|| HandshakeError::InvalidRequest("missing HTTP version".into()))?
            .to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Ok(Self {
            method,
            version,
            headers,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}
