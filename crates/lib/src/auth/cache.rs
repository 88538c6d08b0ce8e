//! Bounded time-to-live cache shared across request handlers.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

struct Entry<V> {
    value: V,
    inserted: Instant,
}

/// Entries expire `ttl` after insertion. At capacity, expired entries are purged first,
/// then the oldest insertion is evicted.
pub struct TtlCache<K, V> {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut g = self.inner.lock().await;
        match g.get(key) {
            Some(e) if e.inserted.elapsed() < self.ttl => Some(e.value.clone()),
            Some(_) => {
                g.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn insert(&self, key: K, value: V) {
        let mut g = self.inner.lock().await;
        if !g.contains_key(&key) && g.len() >= self.capacity {
            let ttl = self.ttl;
            g.retain(|_, e| e.inserted.elapsed() < ttl);
            if g.len() >= self.capacity {
                let oldest = g
                    .iter()
                    .min_by_key(|(_, e)| e.inserted)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    g.remove(&k);
                }
            }
        }
        g.insert(
            key,
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(600), 10);
        cache.insert("k", 1).await;
        tokio::time::advance(Duration::from_secs(599)).await;
        assert_eq!(cache.get(&"k").await, Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get(&"k").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_oldest() {
        let cache = TtlCache::new(Duration::from_secs(600), 2);
        cache.insert("a", 1).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("b", 2).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.insert("c", 3).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get(&"a").await, None);
        assert_eq!(cache.get(&"b").await, Some(2));
        assert_eq!(cache.get(&"c").await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_prefers_purging_expired() {
        let cache = TtlCache::new(Duration::from_secs(10), 2);
        cache.insert("old", 1).await;
        tokio::time::advance(Duration::from_secs(5)).await;
        cache.insert("newer", 2).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        cache.insert("newest", 3).await;
        assert_eq!(cache.get(&"newer").await, Some(2));
        assert_eq!(cache.get(&"newest").await, Some(3));
    }

    #[tokio::test]
    async fn overwrite_at_capacity_keeps_others() {
        let cache = TtlCache::new(Duration::from_secs(600), 2);
        cache.insert("a", 1).await;
        cache.insert("b", 2).await;
        cache.insert("a", 10).await;
        assert_eq!(cache.get(&"a").await, Some(10));
        assert_eq!(cache.get(&"b").await, Some(2));
    }
}
