use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::time::sleep;

/// Coalesces bursts of calls: after a quiet period only the latest caller
/// proceeds.
pub struct Debouncer {
    generation: AtomicU64,
    delay: Duration,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            generation: AtomicU64::new(0),
            delay,
        }
    }

    /// Wait out the delay. Yields the caller's generation if no newer call
    /// arrived meanwhile; keep it to check [`is_current`](Self::is_current)
    /// once the debounced work finishes.
    pub async fn settle(&self) -> Option<u64> {
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        sleep(self.delay).await;
        self.is_current(mine).then_some(mine)
    }

    /// Whether nothing newer than `generation` has arrived.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate any caller currently waiting.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn only_latest_call_wins() {
        let d = Arc::new(Debouncer::new(Duration::from_millis(30)));
        let first = {
            let d = d.clone();
            tokio::spawn(async move { d.settle().await })
        };
        sleep(Duration::from_millis(10)).await;
        let second = {
            let d = d.clone();
            tokio::spawn(async move { d.settle().await })
        };
        assert_eq!(first.await.unwrap(), None);
        assert_eq!(second.await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn cancel_drops_waiter() {
        let d = Arc::new(Debouncer::new(Duration::from_millis(20)));
        let waiter = {
            let d = d.clone();
            tokio::spawn(async move { d.settle().await })
        };
        sleep(Duration::from_millis(5)).await;
        d.cancel();
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_call_invalidates_settled_one() {
        let d = Debouncer::new(Duration::from_millis(5));
        let generation = d.settle().await.unwrap();
        assert!(d.is_current(generation));
        d.cancel();
        assert!(!d.is_current(generation));
    }
}
