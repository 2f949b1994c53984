//! Per-entity-id serialization for reconciliation routines.
//!
//! The store offers per-document atomicity only, so two concurrent handlers
//! mutating the same pool's loan membership would race (read, modify, write
//! back, lost update). Every reconciliation routine therefore acquires the
//! keyed lock for each entity it touches before reading the store.
//!
//! Multi-key acquisition sorts and deduplicates the keys first, so two
//! routines locking overlapping pool sets always acquire in the same order
//! and cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed async mutexes, one per entity id.
///
/// Lock entries are retained for the life of the process; the key space is
/// bounded by the number of distinct entities seen on the stream.
#[derive(Default)]
pub struct EntityLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().await;
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the lock for a single entity key.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.entry(key).await.lock_owned().await
    }

    /// Acquire the locks for several entity keys.
    ///
    /// Keys are sorted and deduplicated before acquisition; the guards are
    /// released together when the returned vector is dropped.
    pub async fn acquire_many(&self, keys: &[String]) -> Vec<OwnedMutexGuard<()>> {
        let mut ordered: Vec<&String> = keys.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.acquire(key).await);
        }
        guards
    }
}
