//! Single-consumer FIFO stage between the transport reader and record processing.
//!
//! The reader side pushes records as soon as they are framed; the consumer
//! awaits them one at a time, so record N is fully handled before N+1 is
//! looked at, however long each step takes.

use tokio::sync::mpsc;

/// Producer half of an ordered queue.
#[derive(Debug)]
pub struct OrderedSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for OrderedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> OrderedSender<T> {
    /// Enqueue an item. Returns `false` once the consumer has gone away.
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of an ordered queue.
#[derive(Debug)]
pub struct OrderedQueue<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T> OrderedQueue<T> {
    /// Create a connected producer/consumer pair.
    pub fn new() -> (OrderedSender<T>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (OrderedSender { tx }, Self { rx })
    }

    /// Next item in push order, or `None` when every sender is dropped and
    /// the queue has drained.
    pub async fn next(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop accepting new items; already queued ones can still be taken.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_push_order_despite_random_latency() {
        let (tx, mut queue) = OrderedQueue::new();
        for i in 0..64u32 {
            assert!(tx.push(i));
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = queue.next().await {
            let delay = rand::rng().random_range(0..3u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            seen.push(i);
        }
        assert_eq!(seen, (0..64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn producer_task_interleaves_with_slow_consumer() {
        let (tx, mut queue) = OrderedQueue::new();
        let producer = tokio::spawn(async move {
            for i in 0..32u32 {
                tx.push(i);
                if i % 5 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });

        let mut out = Vec::new();
        while let Some(i) = queue.next().await {
            let delay = rand::rng().random_range(0..2u64);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            out.push(i);
        }
        producer.await.unwrap();
        assert_eq!(out, (0..32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn push_after_close_is_refused() {
        let (tx, mut queue) = OrderedQueue::<u8>::new();
        assert!(tx.push(1));
        queue.close();
        assert!(!tx.push(2));
        assert!(tx.is_closed());
        assert_eq!(queue.next().await, Some(1));
        assert_eq!(queue.next().await, None);
    }
}
