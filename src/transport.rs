//! Byte-stream transport adapter.
//!
//! The engine talks to the network through the [`Transport`] trait so the
//! protocol code never sees whether the stream is plain TCP or TLS-wrapped,
//! and tests can substitute their own endpoint.

use crate::error::{FrameSockError, Result};
use crate::tls::TlsConfig;
use crate::url::ConnectionTarget;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Upper bound on a single write to the underlying stream.
pub const SEND_CHUNK_SIZE: usize = 16 * 1024;

const READ_BUF_SIZE: usize = 8 * 1024;

/// Connect/send/recv/close over a byte stream.
#[async_trait]
pub trait Transport: Send {
    /// Write all of `data`, in chunks of at most [`SEND_CHUNK_SIZE`].
    /// A failed chunk aborts the send.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait up to `timeout` for bytes.
    ///
    /// `Ok(None)` means the timeout elapsed with nothing to read, which is a
    /// neutral outcome, not an error. A peer hangup or read failure is fatal
    /// for the connection and surfaces as `Err`.
    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>>;

    /// Close the stream. Idempotent.
    async fn shutdown(&mut self);

    /// Whether the stream is still usable.
    fn is_connected(&self) -> bool;
}

enum Stream {
    Plain(TcpStream),
    Tls(Box<tokio_native_tls::TlsStream<TcpStream>>),
}

/// TCP transport, optionally TLS-wrapped for `wss://` targets.
pub struct NetTransport {
    stream: Stream,
    connected: bool,
}

impl NetTransport {
    async fn write_chunk(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match &mut self.stream {
            Stream::Plain(s) => s.write_all(chunk).await,
            Stream::Tls(s) => s.write_all(chunk).await,
        }
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.stream {
            Stream::Plain(s) => s.read(buf).await,
            Stream::Tls(s) => s.read(buf).await,
        }
    }
}

#[async_trait]
impl Transport for NetTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(FrameSockError::NotConnected);
        }
        for chunk in data.chunks(SEND_CHUNK_SIZE) {
            if let Err(e) = self.write_chunk(chunk).await {
                self.connected = false;
                return Err(FrameSockError::Transport(format!("send failed: {e}")));
            }
        }
        Ok(())
    }

    async fn recv(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        if !self.connected {
            return Err(FrameSockError::NotConnected);
        }
        let mut buf = vec![0u8; READ_BUF_SIZE];
        match tokio::time::timeout(timeout, self.read_some(&mut buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                self.connected = false;
                Err(FrameSockError::ConnectionClosed(
                    "transport closed by peer".into(),
                ))
            }
            Ok(Ok(n)) => Ok(Some(Bytes::copy_from_slice(&buf[..n]))),
            Ok(Err(e)) => {
                self.connected = false;
                Err(FrameSockError::Transport(format!("read failed: {e}")))
            }
        }
    }

    async fn shutdown(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        let result = match &mut self.stream {
            Stream::Plain(s) => s.shutdown().await,
            Stream::Tls(s) => s.shutdown().await,
        };
        if let Err(e) = result {
            debug!(error = %e, "transport shutdown");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Dial the target and, for `wss://`, run the TLS handshake.
pub async fn connect(
    target: &ConnectionTarget,
    tls: Option<&TlsConfig>,
    timeout: Duration,
) -> Result<NetTransport> {
    let stream = tokio::time::timeout(
        timeout,
        TcpStream::connect((target.host.as_str(), target.port)),
    )
    .await
    .map_err(|_| FrameSockError::ConnectTimeout(timeout))?
    .map_err(|e| FrameSockError::Transport(format!("connect failed: {e}")))?;

    let _ = stream.set_nodelay(true);
    debug!(host = %target.host, port = target.port, tls = target.tls, "transport connected");

    if target.tls {
        let default_config = TlsConfig::default();
        let config = tls.unwrap_or(&default_config);
        let connector = tokio_native_tls::TlsConnector::from(config.connector()?);
        let tls_stream = tokio::time::timeout(timeout, connector.connect(&target.host, stream))
            .await
            .map_err(|_| FrameSockError::ConnectTimeout(timeout))?
            .map_err(|e| FrameSockError::Tls(e.to_string()))?;
        Ok(NetTransport {
            stream: Stream::Tls(Box::new(tls_stream)),
            connected: true,
        })
    } else {
        Ok(NetTransport {
            stream: Stream::Plain(stream),
            connected: true,
        })
    }
}
