//! # FrameSock
//!
//! A reconnecting WebSocket client protocol engine (RFC 6455 subset).
//!
//! FrameSock owns the whole client side of the protocol: the HTTP upgrade
//! handshake with accept-key verification, masked frame encoding, an
//! incremental frame decoder that reassembles fragmented messages across
//! partial transport reads, an outbound FIFO queue with swap-based draining,
//! and a run loop that survives transport failures with keepalive pings and
//! cooperative cancellation.
//!
//! ## Features
//!
//! - **Single cooperative task**: one engine serves one connection at a time;
//!   all out-of-band input (enqueues, keepalive ticks, exit requests) funnels
//!   through one wake channel observed by a single `select!`.
//! - **Resumable decoding**: partial frames carry over between transport
//!   reads without rescanning.
//! - **Strict framing**: non-zero RSV bits, masked server frames, oversized
//!   or fragmented control frames and 64-bit lengths are all rejected.
//! - **Pluggable reconnect policies**: fixed delay or exponential backoff.
//!
//! ## Example
//!
//! ```rust,ignore
//! use framesock::{Event, RunOptions, WsClient};
//!
//! #[tokio::main]
//! async fn main() -> framesock::Result<()> {
//!     let mut client = WsClient::new("wss://api.example.com/feed", None)?;
//!     client.on(Event::Message, |data| {
//!         println!("message: {} bytes", data.payload.len());
//!     });
//!
//!     let handle = client.handle();
//!     handle.send("subscribe", true)?;
//!
//!     // Blocks until an exit request; reconnects on failures.
//!     client.run(RunOptions::default()).await
//! }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod frame;
pub mod handshake;
pub mod keepalive;
pub mod queue;
pub mod reconnect;
pub mod signal;
pub mod state;
pub mod tls;
pub mod transport;
pub mod url;

pub use client::{EngineHandle, RunOptions, WsClient};
pub use error::{FrameSockError, Result};
pub use events::{Callback, CallbackTable, Event, EventData};
pub use frame::{Frame, FrameDecoder, Opcode};
pub use queue::{OutboundItem, OutboundQueue};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectPolicy};
pub use signal::Wake;
pub use state::{AtomicClientState, ClientState};
pub use tls::TlsConfig;
pub use transport::{NetTransport, Transport, SEND_CHUNK_SIZE};
pub use url::ConnectionTarget;
