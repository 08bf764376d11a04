//! Wake channel.
//!
//! All out-of-band inputs to a blocked receive funnel through one channel:
//! outbound-queue-not-empty, keepalive ticks, and exit requests. A single
//! `select!` arm observes all three without tight-loop polling.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Out-of-band signals delivered to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The outbound queue has items to drain.
    SendReady,
    /// Keepalive interval elapsed; a ping should go out.
    KeepaliveTick,
    /// Exit request carrying the target engine's token. Signals with a
    /// foreign token are ignored.
    Exit(u64),
}

/// Sending half of the wake channel; clonable across tasks.
#[derive(Debug, Clone)]
pub struct WakeSender {
    tx: mpsc::UnboundedSender<Wake>,
}

impl WakeSender {
    /// Publish a wake signal. Returns false if the engine is gone.
    pub fn publish(&self, wake: Wake) -> bool {
        self.tx.send(wake).is_ok()
    }
}

/// Receiving half, owned by the engine's run loop.
#[derive(Debug)]
pub struct WakeReceiver {
    rx: mpsc::UnboundedReceiver<Wake>,
}

impl WakeReceiver {
    pub async fn recv(&mut self) -> Option<Wake> {
        self.rx.recv().await
    }
}

/// Create a connected wake channel pair.
pub fn wake_channel() -> (WakeSender, WakeReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WakeSender { tx }, WakeReceiver { rx })
}

/// Allocate a process-unique engine token for exit-signal filtering.
pub(crate) fn next_engine_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}
