//! Per-user active-stream bookkeeping.
//!
//! At most one stream is active per user. Opening a new one cancels the
//! prior holder, which observes the cancellation and emits its `error`
//! terminal before closing.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify};

struct ActiveStream {
    id: u64,
    cancel: Arc<Notify>,
}

/// Registry of active streams keyed by user id.
#[derive(Default)]
pub struct StreamRegistry {
    inner: Mutex<HashMap<String, ActiveStream>>,
    next_id: AtomicU64,
}

/// The active-stream slot held by one running exchange.
pub struct StreamHandle {
    user_id: String,
    id: u64,
    cancel: Arc<Notify>,
}

impl StreamHandle {
    /// Resolves when a newer stream for the same user supersedes this one.
    pub async fn cancelled(&self) {
        self.cancel.notified().await;
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the user's stream slot, cancelling any prior holder.
    pub async fn begin(&self, user_id: &str) -> StreamHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = Arc::new(Notify::new());
        let mut map = self.inner.lock().await;
        if let Some(prev) = map.insert(
            user_id.to_string(),
            ActiveStream {
                id,
                cancel: Arc::clone(&cancel),
            },
        ) {
            tracing::debug!(user_id, "Superseding active stream");
            // notify_one stores a permit, so the old stream sees the
            // cancellation even if it is not awaiting right now.
            prev.cancel.notify_one();
        }
        StreamHandle {
            user_id: user_id.to_string(),
            id,
            cancel,
        }
    }

    /// Release the slot if the handle still owns it.
    pub async fn finish(&self, handle: &StreamHandle) {
        let mut map = self.inner.lock().await;
        if map.get(&handle.user_id).is_some_and(|a| a.id == handle.id) {
            map.remove(&handle.user_id);
        }
    }

    #[cfg(test)]
    async fn active_count(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn second_stream_cancels_the_first() {
        let registry = StreamRegistry::new();
        let first = registry.begin("alice").await;
        let _second = registry.begin("alice").await;

        timeout(Duration::from_millis(100), first.cancelled())
            .await
            .expect("first stream was not cancelled");
    }

    #[tokio::test]
    async fn cancellation_permit_survives_late_await() {
        let registry = StreamRegistry::new();
        let first = registry.begin("alice").await;
        let _second = registry.begin("alice").await;

        // The first holder only starts waiting after being superseded.
        tokio::time::sleep(Duration::from_millis(10)).await;
        timeout(Duration::from_millis(100), first.cancelled())
            .await
            .expect("stored permit was lost");
    }

    #[tokio::test]
    async fn streams_for_different_users_are_independent() {
        let registry = StreamRegistry::new();
        let alice = registry.begin("alice").await;
        let _bob = registry.begin("bob").await;

        assert!(
            timeout(Duration::from_millis(50), alice.cancelled())
                .await
                .is_err(),
            "bob's stream must not cancel alice's"
        );
    }

    #[tokio::test]
    async fn finish_only_releases_the_current_holder() {
        let registry = StreamRegistry::new();
        let first = registry.begin("alice").await;
        let second = registry.begin("alice").await;

        // The superseded stream finishing must not evict its successor.
        registry.finish(&first).await;
        assert_eq!(registry.active_count().await, 1);

        registry.finish(&second).await;
        assert_eq!(registry.active_count().await, 0);
    }
}
