//! Generic fan-in of dynamically-arriving producers.
//!
//! Producers show up one at a time (one per manifest fetch, one per
//! report-key stream); [`FanIn`] merges them into a single receiver.
//! Every item from every producer is delivered exactly once, in no
//! particular order across producers, and the merged receiver closes
//! only once the handle has been dropped and every attached producer has
//! drained.

use tokio::sync::mpsc;

/// Handle for attaching producers to a merged stream.
///
/// Dropping the handle signals that no further producers will arrive;
/// the merged receiver then closes as soon as the already-attached
/// producers finish.
pub struct FanIn<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> FanIn<T> {
    /// Create a fan-in stage and its merged output receiver.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Attach a producer. Its items are forwarded to the merged receiver
    /// until it closes.
    pub fn add(&self, mut source: mpsc::Receiver<T>) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(item) = source.recv().await {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn collect(mut rx: mpsc::Receiver<u32>) -> Vec<u32> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn merges_all_producers_exactly_once() {
        let (merge, rx) = FanIn::new(4);

        for batch in [0..5u32, 0..0, 5..8] {
            let (tx, source) = mpsc::channel(4);
            merge.add(source);
            tokio::spawn(async move {
                for item in batch {
                    tx.send(item).await.unwrap();
                }
            });
        }
        drop(merge);

        let mut items = collect(rx).await;
        items.sort_unstable();
        assert_eq!(items, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn closes_only_after_slowest_producer() {
        let (merge, mut rx) = FanIn::new(4);

        let (fast, source) = mpsc::channel(4);
        merge.add(source);
        let (slow, source) = mpsc::channel(4);
        merge.add(source);
        drop(merge);

        fast.send(1).await.unwrap();
        drop(fast);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            slow.send(2).await.unwrap();
        });

        assert_eq!(rx.recv().await, Some(1));
        // The merged stream must stay open until the delayed producer has
        // finished, then deliver its item and close.
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn empty_fan_in_closes_immediately() {
        let (merge, mut rx) = FanIn::<u32>::new(1);
        drop(merge);
        assert_eq!(rx.recv().await, None);
    }
}
