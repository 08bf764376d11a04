//! Event callback dispatch.
//!
//! A fixed enumeration of event kinds replaces name-keyed lookup: each kind
//! holds at most one handler, and firing an unset slot is a no-op. The table
//! persists across reconnects.

use bytes::Bytes;
use tracing::debug;

/// Events a client engine can report to user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Handshake completed; fires exactly once per successful handshake.
    Open,
    /// A complete (reassembled) application message arrived.
    Message,
    /// The peer closed the connection.
    Close,
    /// A per-connection failure (transport, handshake, protocol).
    Error,
    /// A pong frame arrived.
    Pong,
    /// An outbound message was transmitted.
    Sent,
}

impl Event {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        match self {
            Self::Open => 0,
            Self::Message => 1,
            Self::Close => 2,
            Self::Error => 3,
            Self::Pong => 4,
            Self::Sent => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message => "message",
            Self::Close => "close",
            Self::Error => "error",
            Self::Pong => "pong",
            Self::Sent => "sent",
        }
    }
}

/// Payload handed to an event handler.
#[derive(Debug, Clone, Default)]
pub struct EventData {
    /// Message, pong or sent payload; empty for lifecycle events.
    pub payload: Bytes,
    /// Close code, for `Close` events carrying one.
    pub code: Option<u16>,
    /// Close reason or error description.
    pub reason: Option<String>,
}

impl EventData {
    pub fn with_payload(payload: Bytes) -> Self {
        Self {
            payload,
            ..Default::default()
        }
    }

    pub fn close(code: Option<u16>, reason: Option<String>) -> Self {
        Self {
            code,
            reason,
            ..Default::default()
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            reason: Some(message),
            ..Default::default()
        }
    }
}

/// User-supplied event handler.
pub type Callback = Box<dyn Fn(&EventData) + Send + Sync>;

/// One optional handler per event kind.
pub struct CallbackTable {
    slots: [Option<Callback>; Event::COUNT],
}

impl CallbackTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Register a handler, replacing any previous one for the same event.
    pub fn set(&mut self, event: Event, callback: Callback) {
        self.slots[event.index()] = Some(callback);
    }

    /// Invoke the handler for `event`, if registered.
    pub fn fire(&self, event: Event, data: &EventData) {
        if let Some(callback) = &self.slots[event.index()] {
            debug!(event = event.name(), "dispatching callback");
            callback(data);
        }
    }

    pub fn is_registered(&self, event: Event) -> bool {
        self.slots[event.index()].is_some()
    }
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self::new()
    }
}
