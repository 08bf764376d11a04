//! Client connection state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a client engine.
///
/// A fresh engine starts in `Connecting`. Only `Open` permits sending and
/// delivering application messages; `Closing` and `Closed` suppress both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ClientState {
    /// Upper-case name as reported by `WsClient::state()`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Lock-free client state holder shared between the run loop and handles.
#[derive(Debug)]
pub struct AtomicClientState(AtomicU8);

impl AtomicClientState {
    pub fn new(state: ClientState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> ClientState {
        ClientState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ClientState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ClientState::Open
    }
}

impl Default for AtomicClientState {
    fn default() -> Self {
        Self::new(ClientState::Connecting)
    }
}
