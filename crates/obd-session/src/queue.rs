//! Bounded sample queue between a supervisor and a Read stream
//!
//! The queue is the only state shared between the supervisor task (sole
//! producer) and the session's Read stream (sole consumer). Its capacity is a
//! memory bound: a stalled consumer makes `put` fail instead of letting
//! samples pile up.

use std::time::Duration;

use obd_core::{GatewayError, GatewayResult, ResponseEnvelope};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, Mutex};

/// Bounded FIFO of response envelopes
pub struct SampleQueue {
    tx: mpsc::Sender<ResponseEnvelope>,
    rx: Mutex<mpsc::Receiver<ResponseEnvelope>>,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` envelopes (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Insert an envelope, waiting up to `timeout` for a free slot.
    ///
    /// On timeout the envelope is discarded and `QueueFull` is returned;
    /// queued envelopes are never overwritten.
    pub async fn put(&self, item: ResponseEnvelope, timeout: Duration) -> GatewayResult<()> {
        match self.tx.send_timeout(item, timeout).await {
            Ok(()) => Ok(()),
            // The receiver lives as long as `self`, so Closed cannot happen here
            Err(SendTimeoutError::Timeout(_)) | Err(SendTimeoutError::Closed(_)) => {
                Err(GatewayError::QueueFull)
            }
        }
    }

    /// Remove the oldest envelope, waiting until one is available.
    ///
    /// Cancel-safe: dropping the future never loses an envelope.
    pub async fn get(&self) -> ResponseEnvelope {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(item) => item,
            // The sender lives as long as `self`
            None => std::future::pending().await,
        }
    }

    /// Remove the oldest envelope if one is queued
    pub async fn try_get(&self) -> Option<ResponseEnvelope> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obd_core::LinkStatus;

    fn envelope(seq: u64) -> ResponseEnvelope {
        ResponseEnvelope::status(LinkStatus::new(true, true)).with_seq(seq)
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = SampleQueue::new(10);
        for seq in 1..=5 {
            queue.put(envelope(seq), Duration::from_secs(1)).await.unwrap();
        }
        assert_eq!(queue.len(), 5);

        let mut order = Vec::new();
        for _ in 0..5 {
            order.push(queue.get().await.seq);
        }
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_beyond_capacity_fails() {
        let queue = SampleQueue::new(2);
        queue.put(envelope(1), Duration::from_secs(1)).await.unwrap();
        queue.put(envelope(2), Duration::from_secs(1)).await.unwrap();

        let result = queue.put(envelope(3), Duration::from_secs(1)).await;
        assert_eq!(result, Err(GatewayError::QueueFull));
        assert_eq!(queue.len(), 2);

        // The rejected envelope was not inserted
        assert_eq!(queue.get().await.seq, 1);
        assert_eq!(queue.get().await.seq, 2);
        assert!(queue.try_get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_waits_for_free_slot() {
        let queue = std::sync::Arc::new(SampleQueue::new(1));
        queue.put(envelope(1), Duration::from_secs(1)).await.unwrap();

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                queue.get().await
            })
        };

        queue.put(envelope(2), Duration::from_secs(1)).await.unwrap();
        assert_eq!(consumer.await.unwrap().seq, 1);
        assert_eq!(queue.get().await.seq, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_blocks_until_item() {
        let queue = SampleQueue::new(4);
        let pending = tokio::time::timeout(Duration::from_secs(60), queue.get()).await;
        assert!(pending.is_err());

        queue.put(envelope(7), Duration::from_secs(1)).await.unwrap();
        assert_eq!(queue.get().await.seq, 7);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = SampleQueue::new(0);
        assert_eq!(queue.capacity(), 1);
    }
}
