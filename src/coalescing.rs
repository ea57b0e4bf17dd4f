// Single-flight coalescing of derivative computations
//
// Deduplicates concurrent computations of the same DerivedKey:
// - First caller (leader): computes and stores the derivative, then drops its guard
// - Later callers (followers): wait for the leader, then re-check the store
// - A follower that finds nothing stored (leader failed) computes on its own

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::store::DerivedKey;

/// Tracks in-flight derivative computations
#[derive(Debug, Clone, Default)]
pub struct Coalescer {
    /// key -> completion signal; the leader sends `true` when done
    in_flight: Arc<tokio::sync::Mutex<HashMap<DerivedKey, watch::Sender<bool>>>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a slot for `key`
    ///
    /// Returns `CoalescingSlot::Leader` if nobody is computing `key`; the
    /// leader computes, stores, then drops the guard. Otherwise waits for
    /// the current leader and returns `CoalescingSlot::Follower`.
    pub async fn acquire(&self, key: &DerivedKey) -> CoalescingSlot {
        let mut in_flight = self.in_flight.lock().await;

        if let Some(sender) = in_flight.get(key) {
            let mut rx = sender.subscribe();
            drop(in_flight);
            // An Err here means the leader vanished; either way it is done
            let _ = rx.wait_for(|&completed| completed).await;
            return CoalescingSlot::Follower;
        }

        // Checking and inserting under one lock leaves no window for a second leader
        let (tx, _rx) = watch::channel(false);
        in_flight.insert(key.clone(), tx.clone());
        drop(in_flight);

        CoalescingSlot::Leader(LeaderGuard {
            key: key.clone(),
            coalescer: self.clone(),
            sender: tx,
        })
    }

    /// Current number of in-flight computations
    pub async fn in_flight_count(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    async fn remove_in_flight(&self, key: &DerivedKey) {
        self.in_flight.lock().await.remove(key);
    }
}

/// Result of acquiring a coalescing slot
#[derive(Debug)]
pub enum CoalescingSlot {
    /// Compute the derivative; followers are released when the guard drops
    Leader(LeaderGuard),

    /// Another computation for the key has finished; check the store
    Follower,
}

impl CoalescingSlot {
    pub fn is_leader(&self) -> bool {
        matches!(self, CoalescingSlot::Leader(_))
    }

    pub fn is_follower(&self) -> bool {
        matches!(self, CoalescingSlot::Follower)
    }
}

/// Held by the leader; dropping it (on success or failure) releases followers
#[derive(Debug)]
pub struct LeaderGuard {
    key: DerivedKey,
    coalescer: Coalescer,
    sender: watch::Sender<bool>,
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        let _ = self.sender.send(true);

        // Drop is not async, so the map cleanup runs as a task
        let coalescer = self.coalescer.clone();
        let key = self.key.clone();
        tokio::spawn(async move {
            coalescer.remove_in_flight(&key).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ImageFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn key() -> DerivedKey {
        DerivedKey::new("img1", "thumb", ImageFormat::Png)
    }

    #[tokio::test]
    async fn test_first_request_becomes_leader() {
        let coalescer = Coalescer::new();
        let slot = coalescer.acquire(&key()).await;
        assert!(slot.is_leader());
        assert_eq!(coalescer.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn test_follower_waits_for_leader() {
        let coalescer = Coalescer::new();
        let finished = Arc::new(AtomicUsize::new(0));

        let slot = coalescer.acquire(&key()).await;
        assert!(slot.is_leader());

        let follower = {
            let coalescer = coalescer.clone();
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                let slot = coalescer.acquire(&key()).await;
                finished.fetch_add(1, Ordering::SeqCst);
                slot.is_follower()
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0, "follower should be waiting");

        drop(slot);
        assert!(follower.await.unwrap());
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_coalesce() {
        let coalescer = Coalescer::new();
        let a = coalescer.acquire(&key()).await;
        let b = coalescer
            .acquire(&DerivedKey::new("img1", "thumb", ImageFormat::WebP))
            .await;
        assert!(a.is_leader());
        assert!(b.is_leader());
        assert_eq!(coalescer.in_flight_count().await, 2);
    }

    #[tokio::test]
    async fn test_cleanup_after_leader_drops() {
        let coalescer = Coalescer::new();
        drop(coalescer.acquire(&key()).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(coalescer.in_flight_count().await, 0);
        assert!(coalescer.acquire(&key()).await.is_leader());
    }
}
