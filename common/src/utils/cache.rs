use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

/// §6 cache collaborator contract. Cache unavailability must never fail a
/// retrieval (§4.3 invariant); implementations should make errors
/// effectively impossible rather than expose a `Result` callers are tempted
/// to propagate.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<u8>>;
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
    async fn delete_pattern(&self, prefix: &str);
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// A lock-free-at-the-API-level, in-process TTL cache. Stampedes (two
/// callers missing and recomputing concurrently) are accepted per §4.3 —
/// the cache is an optimization, not a serialization point.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at < Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn delete_pattern(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stale_entries_are_never_returned() {
        let cache = InMemoryCache::new();
        cache
            .set("search:owner-1:abc", b"result".to_vec(), Duration::from_millis(10))
            .await;
        assert!(cache.get("search:owner-1:abc").await.is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("search:owner-1:abc").await.is_none());
    }

    #[tokio::test]
    async fn delete_pattern_scopes_invalidation_to_the_owner() {
        let cache = InMemoryCache::new();
        cache
            .set("search:owner-1:a", b"1".to_vec(), Duration::from_secs(60))
            .await;
        cache
            .set("search:owner-2:b", b"2".to_vec(), Duration::from_secs(60))
            .await;

        cache.delete_pattern("search:owner-1:").await;

        assert!(cache.get("search:owner-1:a").await.is_none());
        assert!(cache.get("search:owner-2:b").await.is_some());
    }
}
