//! Per-match mutual exclusion for scoring transactions

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Registry of per-match locks, created lazily and dropped once idle
#[derive(Default)]
pub struct MatchLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl MatchLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Get (or create) the lock for `match_id`
    fn handle(&self, match_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(match_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Forget the lock when nobody else holds a handle to it
    fn release(&self, match_id: Uuid) {
        self.locks
            .remove_if(&match_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Run `f` while holding the lock for `match_id`
    pub async fn serialized<T, F, Fut>(&self, match_id: Uuid, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // Must drop after `lock`, also when the caller abandons this future
        let _release = Release {
            locks: self,
            match_id,
        };
        let lock = self.handle(match_id);
        let _guard = lock.lock().await;
        f().await
    }

    /// Number of matches with a live lock
    #[cfg(test)]
    fn active(&self) -> usize {
        self.locks.len()
    }
}

/// Drops the registry entry for a match once its last user is gone
struct Release<'a> {
    locks: &'a MatchLocks,
    match_id: Uuid,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.locks.release(self.match_id);
    }
}
