//! Common test utilities for framesock integration tests.
//!
//! Provides a raw-TCP mock WebSocket server that speaks the server side of
//! RFC 6455 (unmasked frames out, masked frames in) using the crate's own
//! handshake and masking primitives.

#![allow(dead_code)]

use framesock::handshake::accept_key;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

/// Initialize tracing output for a test. Safe to call from every test; only
/// the first call in the process installs the subscriber.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// What the mock server does after accepting a TCP connection.
#[derive(Debug, Clone)]
pub enum ServerBehavior {
    /// Complete the handshake, then echo text/binary messages back.
    Echo,
    /// Complete the handshake, then immediately send the given raw bytes and
    /// keep serving control frames.
    SendRaw(Vec<u8>),
    /// Complete the handshake, then send a close frame with code and reason.
    CloseWith(u16, String),
    /// Answer the upgrade with a non-101 status.
    RejectUpgrade(u16),
    /// Answer 101 but with a wrong accept key.
    BadAccept,
    /// Accept the TCP connection and never respond.
    Mute,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Start a server applying `behavior` to every connection.
    pub async fn start(behavior: ServerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_accept = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let behavior = behavior.clone();
                                tokio::spawn(async move {
                                    handle_connection(stream, behavior).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("accept error: {e}");
                                break;
                            }
                        }
                    }
                    _ = shutdown_accept.notified() => break,
                }
            }
        });

        Self { addr, shutdown }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Read an HTTP request head (through the blank line) from the stream.
pub async fn read_request_head(stream: &mut TcpStream) -> Vec<u8> {
    let mut head = Vec::new();
    let mut buf = [0u8; 2048];
    while !contains_terminator(&head) {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    head
}

fn contains_terminator(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Pull the Sec-WebSocket-Key value out of a request head.
pub fn extract_key(head: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(head);
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("sec-websocket-key") {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Build the 101 response for a client key.
pub fn upgrade_response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept_key(key)
    )
}

/// Build an unmasked server-to-client frame.
pub fn server_frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(((fin as u8) << 7) | opcode);
    if payload.len() < 126 {
        out.push(payload.len() as u8);
    } else {
        out.push(126);
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    }
    out.extend_from_slice(payload);
    out
}

/// Parse one masked client frame from the front of `buf`, draining it.
/// Returns `(opcode, fin, unmasked payload)` or None when incomplete.
pub fn parse_client_frame(buf: &mut Vec<u8>) -> Option<(u8, bool, Vec<u8>)> {
    if buf.len() < 2 {
        return None;
    }
    let fin = buf[0] & 0x80 != 0;
    let opcode = buf[0] & 0x0F;
    assert!(buf[1] & 0x80 != 0, "client frame must be masked");

    let len7 = (buf[1] & 0x7F) as usize;
    let (len, header) = if len7 == 126 {
        if buf.len() < 4 {
            return None;
        }
        (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4)
    } else {
        (len7, 2)
    };

    let total = header + 4 + len;
    if buf.len() < total {
        return None;
    }

    let mut key = [0u8; 4];
    key.copy_from_slice(&buf[header..header + 4]);
    let mut payload = buf[header + 4..total].to_vec();
    framesock::frame::mask_payload(&mut payload, key);
    buf.drain(..total);
    Some((opcode, fin, payload))
}

async fn handle_connection(mut stream: TcpStream, behavior: ServerBehavior) {
    let head = read_request_head(&mut stream).await;

    if let ServerBehavior::RejectUpgrade(code) = behavior {
        let response = format!("HTTP/1.1 {code} Denied\r\n\r\n");
        let _ = stream.write_all(response.as_bytes()).await;
        return;
    }

    if matches!(behavior, ServerBehavior::Mute) {
        // Hold the socket open, never answer.
        let mut buf = [0u8; 1024];
        while matches!(stream.read(&mut buf).await, Ok(n) if n > 0) {}
        return;
    }

    let key = match extract_key(&head) {
        Some(key) => key,
        None => return,
    };

    if matches!(behavior, ServerBehavior::BadAccept) {
        let response = "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: Ym9ndXMtYWNjZXB0LWtleQ==\r\n\
             \r\n";
        let _ = stream.write_all(response.as_bytes()).await;
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        return;
    }

    if stream
        .write_all(upgrade_response(&key).as_bytes())
        .await
        .is_err()
    {
        return;
    }

    match behavior {
        ServerBehavior::CloseWith(code, reason) => {
            let mut payload = code.to_be_bytes().to_vec();
            payload.extend_from_slice(reason.as_bytes());
            let _ = stream.write_all(&server_frame(true, 0x8, &payload)).await;
            serve_frames(&mut stream, Vec::new()).await;
        }
        ServerBehavior::SendRaw(bytes) => {
            let _ = stream.write_all(&bytes).await;
            serve_frames(&mut stream, Vec::new()).await;
        }
        ServerBehavior::Echo => {
            serve_frames(&mut stream, Vec::new()).await;
        }
        _ => {}
    }
}

/// Read masked client frames, echoing data, answering pings, echoing closes.
async fn serve_frames(stream: &mut TcpStream, mut acc: Vec<u8>) {
    let mut buf = [0u8; 4096];
    loop {
        while let Some((opcode, _fin, payload)) = parse_client_frame(&mut acc) {
            match opcode {
                0x1 | 0x2 => {
                    if stream
                        .write_all(&server_frame(true, opcode, &payload))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                0x8 => {
                    let _ = stream.write_all(&server_frame(true, 0x8, &payload)).await;
                    return;
                }
                0x9 => {
                    if stream
                        .write_all(&server_frame(true, 0xA, &payload))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                _ => {}
            }
        }
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => acc.extend_from_slice(&buf[..n]),
        }
    }
}
