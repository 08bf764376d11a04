//! Outbound message queue.
//!
//! Enqueue is safe from any task; the run loop drains by swapping the whole
//! deque out under the lock, so a drain never holds the lock while frames are
//! being encoded or transmitted. Insertion order is the send order contract.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// One message awaiting transmission.
#[derive(Debug, Clone)]
pub struct OutboundItem {
    pub payload: Bytes,
    pub is_text: bool,
}

/// FIFO buffer of messages awaiting transmission.
///
/// Persists across reconnects; items enqueued while disconnected go out once
/// a connection is open again.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<OutboundItem>>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item at the tail.
    pub fn push(&self, item: OutboundItem) {
        self.items.lock().push_back(item);
    }

    /// Atomically swap the queue with an empty one and return the captured
    /// items in FIFO order.
    pub fn drain(&self) -> Vec<OutboundItem> {
        let captured = std::mem::take(&mut *self.items.lock());
        captured.into()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn item(tag: u8) -> OutboundItem {
        OutboundItem {
            payload: Bytes::copy_from_slice(&[tag]),
            is_text: false,
        }
    }

    #[test]
    fn drain_preserves_fifo_order() {
        let queue = OutboundQueue::new();
        for tag in 0..5u8 {
            queue.push(item(tag));
        }

        let drained = queue.drain();
        let tags: Vec<u8> = drained.iter().map(|i| i.payload[0]).collect();
        assert_eq!(tags, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_on_empty_queue_returns_nothing() {
        let queue = OutboundQueue::new();
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn items_pushed_after_drain_are_kept() {
        let queue = OutboundQueue::new();
        queue.push(item(1));
        let _ = queue.drain();
        queue.push(item(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain()[0].payload[0], 2);
    }

    #[test]
    fn concurrent_pushes_all_survive_drains() {
        let queue = Arc::new(OutboundQueue::new());
        let mut handles = vec![];

        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for tag in 0..250u8 {
                    queue.push(item(tag));
                }
            }));
        }

        let drainer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut seen = 0usize;
                while seen < 1000 {
                    seen += queue.drain().len();
                    thread::yield_now();
                }
                seen
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(drainer.join().unwrap(), 1000);
        assert!(queue.is_empty());
    }
}
