//! Keepalive timer.
//!
//! A dedicated task publishes a tick on the engine's wake channel at a fixed
//! interval; the run loop answers each tick with a ping frame. The task
//! handle is owned by the run loop and aborted when it exits, so a timer can
//! never outlive its engine or leak across instances.

use crate::signal::{Wake, WakeSender};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Spawn the keepalive timer task.
pub(crate) fn spawn_keepalive(interval: Duration, wake_tx: WakeSender) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick; wait a full interval before pinging.
        ticker.tick().await;
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        debug!(?interval, "keepalive timer started");
        loop {
            ticker.tick().await;
            if !wake_tx.publish(Wake::KeepaliveTick) {
                break;
            }
        }
        debug!("keepalive timer exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::wake_channel;

    #[tokio::test(start_paused = true)]
    async fn ticks_arrive_at_the_configured_interval() {
        let (tx, mut rx) = wake_channel();
        let handle = spawn_keepalive(Duration::from_secs(30), tx);

        tokio::time::advance(Duration::from_secs(29)).await;
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, Some(Wake::KeepaliveTick));

        handle.abort();
    }

    #[tokio::test]
    async fn timer_stops_when_engine_is_gone() {
        let (tx, rx) = wake_channel();
        let handle = spawn_keepalive(Duration::from_millis(5), tx);
        drop(rx);
        // The next tick notices the closed channel and the task finishes.
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
}
