// Per-key mutual exclusion for read-merge-write sequences.
//
// One async mutex per (user, video). The outer map is only held while a
// key's mutex is looked up or inserted, so updates to different keys never
// wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use watchtrack_common::types::WatchKey;

/// Held for the duration of one key's update; releases on drop.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: RwLock<HashMap<WatchKey, Arc<Mutex<()>>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockTimedOut;

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the key's region, giving up after `timeout`.
    pub async fn acquire(&self, key: &WatchKey, timeout: Duration) -> Result<KeyGuard, LockTimedOut> {
        let lock = self.lock_for_key(key).await;
        tokio::time::timeout(timeout, lock.lock_owned()).await.map_err(|_| LockTimedOut)
    }

    /// Drop map entries nobody holds or waits on. Returns how many were removed.
    pub async fn prune_idle(&self) -> usize {
        let mut locks = self.locks.write().await;
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub async fn len(&self) -> usize {
        self.locks.read().await.len()
    }

    async fn lock_for_key(&self, key: &WatchKey) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.read().await.get(key) {
            return Arc::clone(lock);
        }

        let mut locks = self.locks.write().await;
        Arc::clone(locks.entry(key.clone()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use watchtrack_common::types::WatchKey;

    use super::{KeyLocks, LockTimedOut};

    fn key(video_id: &str) -> WatchKey {
        WatchKey::new("user123", video_id).expect("key should be valid")
    }

    #[tokio::test]
    async fn second_acquire_on_same_key_times_out_while_held() {
        let locks = KeyLocks::new();
        let _held = locks
            .acquire(&key("lecture1"), Duration::from_millis(50))
            .await
            .expect("first acquire should succeed");

        let second = locks.acquire(&key("lecture1"), Duration::from_millis(20)).await;
        assert_eq!(second.err(), Some(LockTimedOut));
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let locks = KeyLocks::new();
        let _held = locks
            .acquire(&key("lecture1"), Duration::from_millis(50))
            .await
            .expect("first acquire should succeed");

        locks
            .acquire(&key("lecture2"), Duration::from_millis(20))
            .await
            .expect("other key should not be blocked");
    }

    #[tokio::test]
    async fn released_guard_lets_next_waiter_in() {
        let locks = KeyLocks::new();
        let held = locks
            .acquire(&key("lecture1"), Duration::from_millis(50))
            .await
            .expect("first acquire should succeed");
        drop(held);

        locks
            .acquire(&key("lecture1"), Duration::from_millis(20))
            .await
            .expect("acquire after release should succeed");
    }

    #[tokio::test]
    async fn prune_keeps_held_locks_and_drops_idle_ones() {
        let locks = KeyLocks::new();
        let held = locks
            .acquire(&key("lecture1"), Duration::from_millis(50))
            .await
            .expect("acquire should succeed");
        drop(
            locks
                .acquire(&key("lecture2"), Duration::from_millis(50))
                .await
                .expect("acquire should succeed"),
        );

        assert_eq!(locks.len().await, 2);
        assert_eq!(locks.prune_idle().await, 1);
        assert_eq!(locks.len().await, 1);
        drop(held);
        assert_eq!(locks.prune_idle().await, 1);
    }
}
