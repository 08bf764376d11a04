use std::time::Duration;
use thiserror::Error;

/// Main error type for framesock
#[derive(Error, Debug)]
pub enum FrameSockError {
    /// URL could not be parsed into a connection target
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// TLS configuration or negotiation error
    #[error("TLS error: {0}")]
    Tls(String),

    /// Transport-level failure (dial, send, read)
    #[error("transport error: {0}")]
    Transport(String),

    /// Connection attempt exceeded its deadline
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No handshake response arrived within the timeout
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Server answered the upgrade with a non-101 status
    #[error("handshake rejected with status {0}")]
    HandshakeRejected(u16),

    /// Sec-WebSocket-Accept header missing or incorrect
    #[error("Sec-WebSocket-Accept mismatch")]
    AcceptMismatch,

    /// Peer violated the framing rules
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Frame opcode outside the recognized set
    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    /// Payload needs the 64-bit length field, which is unsupported
    #[error("frame payload too large: {0} bytes")]
    FrameTooLarge(usize),

    /// Connection ended, either by a close frame or a dead transport
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Operation requires an open connection
    #[error("not connected")]
    NotConnected,

    /// Engine was cancelled and may not run again
    #[error("client cancelled")]
    Cancelled,

    /// Generic error
    #[error("error: {0}")]
    Other(String),
}

/// Result type for framesock operations
pub type Result<T> = std::result::Result<T, FrameSockError>;
