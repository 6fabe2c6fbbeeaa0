use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::storage::types::collection::SearchMode;
use common::utils::cache::Cache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::scoring::FusedChunk;

/// §4.3: "the cache is an optimization" — every method here degrades to a
/// cache miss rather than propagating an error, so cache unavailability can
/// never fail a retrieval.
#[derive(Clone)]
pub struct RetrievalCache {
    cache: Arc<dyn Cache>,
    search_ttl: Duration,
    embedding_ttl: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedChunk {
    pub chunk_id: String,
    pub score: f32,
}

impl From<&FusedChunk> for CachedChunk {
    fn from(value: &FusedChunk) -> Self {
        Self {
            chunk_id: value.chunk.id.clone(),
            score: value.score,
        }
    }
}

impl RetrievalCache {
    pub fn new(cache: Arc<dyn Cache>, search_ttl: Duration, embedding_ttl: Duration) -> Self {
        Self {
            cache,
            search_ttl,
            embedding_ttl,
        }
    }

    /// §4.3: `"emb:" + model_id + ":" + sha256(query_text)`.
    pub fn embedding_key(model_id: &str, query_text: &str) -> String {
        format!("emb:{model_id}:{}", hex_sha256(query_text))
    }

    /// §4.3: canonical serialization of
    /// `(owner, collection?, mode, top_k, rerank, normalized_query, sorted(metadata_filter))`
    /// hashed with SHA-256.
    pub fn search_key(
        owner: &str,
        collection: Option<&str>,
        mode: SearchMode,
        top_k: usize,
        rerank: bool,
        query: &str,
        metadata_filter: &HashMap<String, Value>,
    ) -> String {
        let normalized_query = query.trim().to_lowercase();
        let mut sorted_filter: Vec<(String, String)> = metadata_filter
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        sorted_filter.sort();

        let canonical = format!(
            "{owner}|{}|{mode:?}|{top_k}|{rerank}|{normalized_query}|{:?}",
            collection.unwrap_or(""),
            sorted_filter
        );
        format!("search:{owner}:{}", hex_sha256(&canonical))
    }

    pub async fn get_embedding(&self, key: &str) -> Option<Vec<f32>> {
        let bytes = self.cache.get(key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn set_embedding(&self, key: &str, embedding: &[f32]) {
        if let Ok(bytes) = serde_json::to_vec(embedding) {
            self.cache.set(key, bytes, self.embedding_ttl).await;
        }
    }

    pub async fn get_search(&self, key: &str) -> Option<Vec<CachedChunk>> {
        let bytes = self.cache.get(key).await?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn set_search(&self, key: &str, results: &[FusedChunk]) {
        let cached: Vec<CachedChunk> = results.iter().map(CachedChunk::from).collect();
        if let Ok(bytes) = serde_json::to_vec(&cached) {
            self.cache.set(key, bytes, self.search_ttl).await;
        }
    }

    /// §4.3 invalidation: "on any write that alters an owner's retrievable
    /// data... all search-cache entries with that owner in their key are
    /// invalidated; embedding cache is unaffected."
    pub async fn invalidate_owner(&self, owner: &str) {
        self.cache.delete_pattern(&format!("search:{owner}:")).await;
    }
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::cache::InMemoryCache;

    fn cache() -> RetrievalCache {
        RetrievalCache::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(900),
            Duration::from_secs(86400),
        )
    }

    #[test]
    fn embedding_key_is_stable_for_the_same_model_and_query() {
        let a = RetrievalCache::embedding_key("text-embedding-3-small", "hello world");
        let b = RetrievalCache::embedding_key("text-embedding-3-small", "hello world");
        assert_eq!(a, b);
        assert!(a.starts_with("emb:text-embedding-3-small:"));
    }

    #[test]
    fn search_key_changes_when_filter_order_does_not_matter() {
        let mut filter_a = HashMap::new();
        filter_a.insert("category".to_string(), Value::String("docs".into()));
        filter_a.insert("language".to_string(), Value::String("en".into()));

        let mut filter_b = HashMap::new();
        filter_b.insert("language".to_string(), Value::String("en".into()));
        filter_b.insert("category".to_string(), Value::String("docs".into()));

        let key_a = RetrievalCache::search_key(
            "owner-1", None, SearchMode::Hybrid, 5, false, "hello", &filter_a,
        );
        let key_b = RetrievalCache::search_key(
            "owner-1", None, SearchMode::Hybrid, 5, false, "hello", &filter_b,
        );
        assert_eq!(key_a, key_b);
    }

    #[tokio::test]
    async fn invalidate_owner_clears_only_that_owners_search_entries() {
        let cache = cache();
        let key_a = RetrievalCache::search_key(
            "owner-1", None, SearchMode::Semantic, 5, false, "hello", &HashMap::new(),
        );
        let key_b = RetrievalCache::search_key(
            "owner-2", None, SearchMode::Semantic, 5, false, "hello", &HashMap::new(),
        );
        cache.set_search(&key_a, &[]).await;
        cache.set_search(&key_b, &[]).await;

        cache.invalidate_owner("owner-1").await;

        assert!(cache.get_search(&key_a).await.is_none());
        assert!(cache.get_search(&key_b).await.is_some());
    }
}
