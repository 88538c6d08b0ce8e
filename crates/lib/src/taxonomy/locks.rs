//! Per-taxonomy reader/writer locks.
//!
//! Browse calls hold a read lock while checking the database marker and running the tool;
//! clone, checkout, init, reload and upgrade hold the write lock. Entries nobody holds or
//! waits on are dropped from the map on the next lookup.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
pub struct TaxonomyLocks {
    inner: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl TaxonomyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, name: &str) -> Arc<RwLock<()>> {
        let mut g = self.inner.lock().await;
        // Guards and waiters keep a clone, so a count of one means the entry is idle.
        g.retain(|_, lock| Arc::strong_count(lock) > 1);
        g.entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn read(&self, name: &str) -> OwnedRwLockReadGuard<()> {
        self.lock_for(name).await.read_owned().await
    }

    pub async fn write(&self, name: &str) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(name).await.write_owned().await
    }

    /// Number of names with a lock entry.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
