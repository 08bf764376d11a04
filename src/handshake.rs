//! HTTP upgrade handshake (RFC 6455 Section 4, client side).
//!
//! Request sent:
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com:80
//! Connection: Upgrade
//! Upgrade: websocket
//! Origin: http://server.example.com
//! Sec-WebSocket-Version: 13
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! ```
//!
//! The response must carry status `101` and a `Sec-WebSocket-Accept` header
//! equal to `base64(sha1(key + GUID))`.

use crate::error::{FrameSockError, Result};
use crate::transport::Transport;
use crate::url::ConnectionTarget;
use base64::Engine as _;
use bytes::BytesMut;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// RFC 6455 GUID mixed into the accept-key digest.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute the expected `Sec-WebSocket-Accept` value for a handshake key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Generate the random 16-byte nonce key for a new handshake.
fn generate_nonce_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| FrameSockError::Other(format!("entropy source failed: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(nonce))
}

/// Parse the head of an HTTP response into a status code and a header map
/// with lower-cased names.
fn parse_response_head(head: &str) -> Result<(u16, HashMap<String, String>)> {
    let mut lines = head.split("\r\n");
    let status_line = lines
        .next()
        .ok_or(FrameSockError::Protocol("empty handshake response"))?;
    let code = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or(FrameSockError::Protocol("malformed status line"))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    Ok((code, headers))
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Run the upgrade handshake over an established transport.
///
/// On success the returned buffer holds any bytes the server sent after the
/// response head (a frame may ride in the same packet as the `101`); the
/// caller must treat them as the first pending input.
pub async fn perform_handshake(
    transport: &mut dyn Transport,
    target: &ConnectionTarget,
    timeout: Duration,
) -> Result<BytesMut> {
    let key = generate_nonce_key()?;
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {host}:{port}\r\n\
         Connection: Upgrade\r\n\
         Upgrade: websocket\r\n\
         Origin: http://{host}\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         \r\n",
        path = target.path,
        host = target.host,
        port = target.port,
    );
    transport.send(request.as_bytes()).await?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = BytesMut::new();
    let head_end = loop {
        if let Some(idx) = find_head_end(&buf) {
            break idx;
        }
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .ok_or(FrameSockError::HandshakeTimeout)?;
        match transport.recv(remaining).await? {
            Some(bytes) => buf.extend_from_slice(&bytes),
            None => return Err(FrameSockError::HandshakeTimeout),
        }
    };

    let remainder = buf.split_off(head_end + 4);
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let (code, headers) = parse_response_head(&head)?;

    if code != 101 {
        return Err(FrameSockError::HandshakeRejected(code));
    }

    // Exact, case-sensitive compare of the accept value.
    let expected = accept_key(&key);
    match headers.get("sec-websocket-accept") {
        Some(got) if *got == expected => {}
        _ => return Err(FrameSockError::AcceptMismatch),
    }

    debug!(host = %target.host, "handshake accepted");
    Ok(remainder)
}
