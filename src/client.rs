//! Client engine: lifecycle state machine, run loop, public surface.
//!
//! One engine instance serves exactly one connection at a time, across
//! reconnects. All mutation of the transport, pending-input buffer and
//! decoder happens inside the owning task; other tasks interact only through
//! [`EngineHandle`] (enqueue / exit request), which funnels into the wake
//! channel.

use crate::error::{FrameSockError, Result};
use crate::events::{Callback, CallbackTable, Event, EventData};
use crate::frame::{self, FrameDecoder, Opcode};
use crate::keepalive::spawn_keepalive;
use crate::queue::{OutboundItem, OutboundQueue};
use crate::reconnect::{FixedDelay, ReconnectPolicy};
use crate::signal::{next_engine_token, wake_channel, Wake, WakeReceiver, WakeSender};
use crate::state::{AtomicClientState, ClientState};
use crate::tls::TlsConfig;
use crate::transport::{self, Transport};
use crate::url::ConnectionTarget;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default receive poll granularity inside the serve loop.
const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Options for [`WsClient::run`].
pub struct RunOptions {
    /// Interval between keepalive pings.
    pub keepalive: Duration,
    /// Deadline for each dial + handshake attempt.
    pub connect_timeout: Duration,
    /// Upper bound on one blocking receive; the loop re-checks the outbound
    /// queue at this cadence even without wake signals.
    pub recv_timeout: Duration,
    /// Delay policy between reconnection attempts.
    pub reconnect: Box<dyn ReconnectPolicy>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            reconnect: Box::new(FixedDelay::new(Duration::from_secs(3), None)),
        }
    }
}

/// Per-connection resources, rebuilt on every connect attempt.
struct Connection {
    transport: Box<dyn Transport>,
    /// Bytes received but not yet forming a complete frame.
    pending: BytesMut,
    decoder: FrameDecoder,
    /// Set once the peer sent a close frame; suppresses our own close frame.
    peer_closed: bool,
}

/// Outcome of one decode/wait step.
enum Outcome {
    /// A data-bearing step. `payload: None` marks a control-only outcome
    /// (ping answered, pong dispatched) that resets message accumulation.
    Data { fin: bool, payload: Option<Bytes> },
    /// Read timeout or incomplete frame; re-check the queue and retry.
    Idle,
    /// Out-of-band wake signal.
    Woken(Wake),
    /// Peer sent a close frame.
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
}

enum Waited {
    Wake(Option<Wake>),
    Read(Option<Bytes>),
}

/// Clonable handle for interacting with a running engine from other tasks.
#[derive(Clone)]
pub struct EngineHandle {
    queue: Arc<OutboundQueue>,
    wake_tx: WakeSender,
    token: u64,
    state: Arc<AtomicClientState>,
    cancelled: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Enqueue a message for transmission and wake the run loop.
    pub fn send(&self, payload: impl Into<Bytes>, is_text: bool) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(FrameSockError::NotConnected);
        }
        self.queue.push(OutboundItem {
            payload: payload.into(),
            is_text,
        });
        let _ = self.wake_tx.publish(Wake::SendReady);
        Ok(())
    }

    /// Request permanent shutdown of the engine this handle belongs to.
    ///
    /// Delivery is cooperative: the engine notices at its next receive poll.
    pub fn request_exit(&self) {
        let _ = self.wake_tx.publish(Wake::Exit(self.token));
    }

    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_open()
    }
}

/// Reconnecting WebSocket client engine.
pub struct WsClient {
    target: ConnectionTarget,
    tls: Option<TlsConfig>,
    state: Arc<AtomicClientState>,
    callbacks: CallbackTable,
    queue: Arc<OutboundQueue>,
    wake_tx: WakeSender,
    wake_rx: WakeReceiver,
    token: u64,
    cancelled: Arc<AtomicBool>,
    conn: Option<Connection>,
}

impl WsClient {
    /// Create an engine for the given `ws://` or `wss://` URL.
    pub fn new(url: &str, tls: Option<TlsConfig>) -> Result<Self> {
        let target = ConnectionTarget::parse(url)?;
        let (wake_tx, wake_rx) = wake_channel();
        Ok(Self {
            target,
            tls,
            state: Arc::new(AtomicClientState::new(ClientState::Connecting)),
            callbacks: CallbackTable::new(),
            queue: Arc::new(OutboundQueue::new()),
            wake_tx,
            wake_rx,
            token: next_engine_token(),
            cancelled: Arc::new(AtomicBool::new(false)),
            conn: None,
        })
    }

    /// Register an event handler; at most one per event, later wins.
    pub fn on(&mut self, event: Event, callback: impl Fn(&EventData) + Send + Sync + 'static) {
        self.callbacks.set(event, Box::new(callback) as Callback);
    }

    /// Handle for enqueueing and exit requests from other tasks.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            queue: Arc::clone(&self.queue),
            wake_tx: self.wake_tx.clone(),
            token: self.token,
            state: Arc::clone(&self.state),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_open()
    }

    /// Enqueue a message; transmission happens at the next drain point.
    pub fn send(&self, payload: impl Into<Bytes>, is_text: bool) -> Result<()> {
        self.handle().send(payload, is_text)
    }

    /// Dial the target and perform the upgrade handshake.
    ///
    /// On success the engine is `Open` and the `open` callback has fired.
    pub async fn connect(&mut self, timeout: Duration) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(FrameSockError::Cancelled);
        }
        self.state.set(ClientState::Connecting);

        let net = transport::connect(&self.target, self.tls.as_ref(), timeout).await?;
        let mut boxed: Box<dyn Transport> = Box::new(net);
        let pending = crate::handshake::perform_handshake(&mut *boxed, &self.target, timeout).await?;

        self.conn = Some(Connection {
            transport: boxed,
            pending,
            decoder: FrameDecoder::new(),
            peer_closed: false,
        });
        self.state.set(ClientState::Open);
        info!(host = %self.target.host, port = self.target.port, "connection open");
        self.callbacks.fire(Event::Open, &EventData::default());
        Ok(())
    }

    /// Receive the next complete application message.
    ///
    /// Drains the outbound queue before each blocking wait, reassembles
    /// fragmented messages, answers pings, and fires the `message` callback
    /// before returning the assembled bytes. Protocol errors and connection
    /// closure are terminal for the current connection.
    pub async fn recv_message(&mut self) -> Result<Bytes> {
        self.recv_message_within(DEFAULT_RECV_TIMEOUT).await
    }

    async fn recv_message_within(&mut self, recv_timeout: Duration) -> Result<Bytes> {
        let mut assembled = BytesMut::new();
        loop {
            if let Err(e) = self.drain_outbound().await {
                return self.fail(e).await;
            }

            let outcome = match self.next_outcome(recv_timeout).await {
                Ok(outcome) => outcome,
                Err(e) => return self.fail(e).await,
            };

            match outcome {
                Outcome::Data {
                    fin: false,
                    payload: Some(fragment),
                } => assembled.extend_from_slice(&fragment),

                Outcome::Data {
                    fin: true,
                    payload: Some(fragment),
                } => {
                    assembled.extend_from_slice(&fragment);
                    let message = assembled.freeze();
                    self.callbacks
                        .fire(Event::Message, &EventData::with_payload(message.clone()));
                    return Ok(message);
                }

                // Control-only outcome: discard any running accumulation.
                Outcome::Data { payload: None, .. } => assembled.clear(),

                Outcome::Idle => {}

                Outcome::Woken(Wake::SendReady) => {}

                Outcome::Woken(Wake::KeepaliveTick) => {
                    if let Err(e) = self.send_ping().await {
                        return self.fail(e).await;
                    }
                }

                Outcome::Woken(Wake::Exit(token)) => {
                    if token == self.token {
                        info!("exit requested");
                        self.cancelled.store(true, Ordering::Release);
                        self.teardown(true).await;
                        return Err(FrameSockError::Cancelled);
                    }
                    debug!(token, "ignoring exit signal for foreign engine");
                }

                Outcome::Closed { code, reason } => {
                    info!(?code, ?reason, "peer closed connection");
                    self.state.set(ClientState::Closing);
                    self.callbacks
                        .fire(Event::Close, &EventData::close(code, reason.clone()));
                    self.teardown(false).await;
                    let detail = match (code, reason) {
                        (Some(c), Some(r)) => format!("close frame ({c}: {r})"),
                        (Some(c), None) => format!("close frame ({c})"),
                        _ => "close frame".to_string(),
                    };
                    return Err(FrameSockError::ConnectionClosed(detail));
                }
            }
        }
    }

    /// Send a close frame (unless the peer already closed), fire the `close`
    /// callback and tear down.
    pub async fn close(&mut self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
        if self.conn.is_none() {
            self.state.set(ClientState::Closed);
            return Ok(());
        }
        self.state.set(ClientState::Closing);
        let code = code.or(Some(1000));
        if let Some(conn) = self.conn.as_mut() {
            if !conn.peer_closed {
                let payload = frame::encode_close_payload(code, reason);
                let close = frame::encode_frame(true, Opcode::Close, &payload)?;
                if let Err(e) = conn.transport.send(&close).await {
                    debug!(error = %e, "close frame send failed");
                }
            }
        }
        self.callbacks
            .fire(Event::Close, &EventData::close(code, reason.map(str::to_string)));
        self.teardown(false).await;
        Ok(())
    }

    /// Blocking lifecycle loop: connect, serve, reconnect after failures.
    ///
    /// Per-attempt failures never escape; they are logged, the connection is
    /// closed, and the loop retries after the reconnect delay. The loop exits
    /// permanently on an exit request or when the reconnect policy gives up.
    /// A cancelled engine rejects further `run` calls.
    pub async fn run(&mut self, opts: RunOptions) -> Result<()> {
        if self.cancelled.load(Ordering::Acquire) {
            return Err(FrameSockError::Cancelled);
        }

        let keepalive = spawn_keepalive(opts.keepalive, self.wake_tx.clone());
        let mut attempt: usize = 0;

        let exit = loop {
            if self.cancelled.load(Ordering::Acquire) {
                break Ok(());
            }

            match self.connect(opts.connect_timeout).await {
                Ok(()) => {
                    attempt = 0;
                    let error = self.serve(opts.recv_timeout).await;
                    if matches!(error, FrameSockError::Cancelled) {
                        info!("client cancelled, exiting run loop");
                        break Ok(());
                    }
                    warn!(error = %error, "connection lost");
                }
                Err(FrameSockError::Cancelled) => break Ok(()),
                Err(e) => {
                    warn!(error = %e, "connect attempt failed");
                    self.callbacks
                        .fire(Event::Error, &EventData::error(e.to_string()));
                }
            }

            match opts.reconnect.next_delay(attempt) {
                Some(delay) => {
                    info!(?delay, attempt, "reconnecting after delay");
                    if self.wait_reconnect_delay(delay).await {
                        info!("exit requested during reconnect delay");
                        break Ok(());
                    }
                    attempt += 1;
                }
                None => {
                    warn!(attempt, "reconnect policy exhausted, giving up");
                    break Ok(());
                }
            }
        };

        keepalive.abort();
        self.teardown(false).await;
        exit
    }

    /// Serve one connection until a terminal error.
    async fn serve(&mut self, recv_timeout: Duration) -> FrameSockError {
        loop {
            match self.recv_message_within(recv_timeout).await {
                // Message callback already fired inside the reassembly loop.
                Ok(_) => {}
                Err(e) => return e,
            }
        }
    }

    /// Sleep through the reconnect delay, still honoring exit requests.
    /// Returns true when an exit was requested.
    async fn wait_reconnect_delay(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                wake = self.wake_rx.recv() => {
                    if let Some(Wake::Exit(token)) = wake {
                        if token == self.token {
                            self.cancelled.store(true, Ordering::Release);
                            return true;
                        }
                    }
                    // SendReady / KeepaliveTick while disconnected: nothing
                    // to do until the next connection is open.
                }
            }
        }
    }

    /// Transmit every queued item in FIFO order.
    ///
    /// A no-op unless the engine is `Open`; items stay queued for the next
    /// connection otherwise.
    async fn drain_outbound(&mut self) -> Result<()> {
        if !self.state.is_open() || self.queue.is_empty() {
            return Ok(());
        }
        for item in self.queue.drain() {
            let opcode = if item.is_text {
                Opcode::Text
            } else {
                Opcode::Binary
            };
            let encoded = frame::encode_frame(true, opcode, &item.payload)?;
            let conn = self.conn.as_mut().ok_or(FrameSockError::NotConnected)?;
            conn.transport.send(&encoded).await?;
            debug!(len = item.payload.len(), text = item.is_text, "frame sent");
            self.callbacks
                .fire(Event::Sent, &EventData::with_payload(item.payload));
        }
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<()> {
        if !self.state.is_open() {
            return Ok(());
        }
        let ping = frame::encode_frame(true, Opcode::Ping, &[])?;
        let conn = self.conn.as_mut().ok_or(FrameSockError::NotConnected)?;
        conn.transport.send(&ping).await?;
        debug!("keepalive ping sent");
        Ok(())
    }

    /// One decode/wait step: drain already-buffered frames first, then block
    /// on the transport and the wake channel together.
    async fn next_outcome(&mut self, recv_timeout: Duration) -> Result<Outcome> {
        let buffered = {
            let conn = self.conn.as_mut().ok_or(FrameSockError::NotConnected)?;
            conn.decoder.feed(&mut conn.pending)?
        };
        if let Some(frame) = buffered {
            return self.accept_frame(frame).await;
        }

        let waited = {
            let conn = self.conn.as_mut().ok_or(FrameSockError::NotConnected)?;
            let wake_rx = &mut self.wake_rx;
            tokio::select! {
                wake = wake_rx.recv() => Waited::Wake(wake),
                read = conn.transport.recv(recv_timeout) => Waited::Read(read?),
            }
        };

        match waited {
            Waited::Wake(Some(wake)) => Ok(Outcome::Woken(wake)),
            // Channel gone; treat as a plain timeout.
            Waited::Wake(None) => Ok(Outcome::Idle),
            Waited::Read(None) => Ok(Outcome::Idle),
            Waited::Read(Some(bytes)) => {
                let decoded = {
                    let conn = self.conn.as_mut().ok_or(FrameSockError::NotConnected)?;
                    conn.pending.extend_from_slice(&bytes);
                    conn.decoder.feed(&mut conn.pending)?
                };
                match decoded {
                    Some(frame) => self.accept_frame(frame).await,
                    None => Ok(Outcome::Idle),
                }
            }
        }
    }

    /// Turn one decoded frame into an outcome, handling control frames.
    async fn accept_frame(&mut self, frame: crate::frame::Frame) -> Result<Outcome> {
        match frame.opcode {
            Opcode::Ping => {
                debug!(len = frame.payload.len(), "ping received, answering");
                let pong = frame::encode_frame(true, Opcode::Pong, &frame.payload)?;
                let conn = self.conn.as_mut().ok_or(FrameSockError::NotConnected)?;
                conn.transport.send(&pong).await?;
                Ok(Outcome::Data {
                    fin: true,
                    payload: None,
                })
            }
            Opcode::Pong => {
                debug!(len = frame.payload.len(), "pong received");
                self.callbacks
                    .fire(Event::Pong, &EventData::with_payload(frame.payload));
                Ok(Outcome::Data {
                    fin: true,
                    payload: None,
                })
            }
            Opcode::Close => {
                let (code, reason) = frame::parse_close_payload(&frame.payload);
                if let Some(conn) = self.conn.as_mut() {
                    conn.peer_closed = true;
                }
                Ok(Outcome::Closed { code, reason })
            }
            Opcode::Continuation | Opcode::Text | Opcode::Binary => Ok(Outcome::Data {
                fin: frame.fin,
                payload: Some(frame.payload),
            }),
        }
    }

    /// Terminal error path: report, close, surface the error.
    async fn fail(&mut self, error: FrameSockError) -> Result<Bytes> {
        if matches!(error, FrameSockError::Cancelled) {
            return Err(error);
        }
        self.callbacks
            .fire(Event::Error, &EventData::error(error.to_string()));
        self.state.set(ClientState::Closing);
        self.teardown(true).await;
        Err(error)
    }

    /// Drop the connection, optionally sending a close frame first.
    /// Pending input and decoder state die with it; queue and callbacks
    /// persist for the next attempt.
    async fn teardown(&mut self, send_close: bool) {
        if let Some(mut conn) = self.conn.take() {
            if send_close && !conn.peer_closed && conn.transport.is_connected() {
                let payload = frame::encode_close_payload(Some(1000), None);
                if let Ok(close) = frame::encode_frame(true, Opcode::Close, &payload) {
                    let _ = conn.transport.send(&close).await;
                }
            }
            conn.transport.shutdown().await;
        }
        self.state.set(ClientState::Closed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_engine_starts_connecting() {
        let client = WsClient::new("ws://localhost:9001/feed", None).unwrap();
        assert_eq!(client.state(), ClientState::Connecting);
        assert!(!client.is_connected());
    }

    #[test]
    fn new_rejects_bad_urls() {
        assert!(WsClient::new("http://localhost/", None).is_err());
    }

    #[test]
    fn send_enqueues_without_connection() {
        let client = WsClient::new("ws://localhost:9001", None).unwrap();
        client.send(&b"queued"[..], true).unwrap();
        assert_eq!(client.queue.len(), 1);
    }

    #[test]
    fn handles_share_state_and_queue() {
        let client = WsClient::new("ws://localhost:9001", None).unwrap();
        let handle = client.handle();
        handle.send(&b"x"[..], false).unwrap();
        assert_eq!(client.queue.len(), 1);
        assert_eq!(handle.state(), ClientState::Connecting);
    }

    #[tokio::test]
    async fn run_rejects_cancelled_engine() {
        let mut client = WsClient::new("ws://localhost:9001", None).unwrap();
        client.cancelled.store(true, Ordering::Release);
        assert!(matches!(
            client.run(RunOptions::default()).await,
            Err(FrameSockError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn send_fails_after_cancellation() {
        let client = WsClient::new("ws://localhost:9001", None).unwrap();
        client.cancelled.store(true, Ordering::Release);
        assert!(matches!(
            client.send(&b"x"[..], true),
            Err(FrameSockError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn close_without_connection_just_settles_state() {
        let mut client = WsClient::new("ws://localhost:9001", None).unwrap();
        client.close(Some(1000), Some("done")).await.unwrap();
        assert_eq!(client.state(), ClientState::Closed);
    }

    #[test]
    fn default_run_options() {
        let opts = RunOptions::default();
        assert_eq!(opts.keepalive, Duration::from_secs(30));
        assert!(opts.reconnect.next_delay(0).is_some());
    }
}
