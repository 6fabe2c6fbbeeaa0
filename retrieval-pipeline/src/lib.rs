pub mod cache;
pub mod config;
pub mod filter;
pub mod modes;
pub mod reranking;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::chunk::{Chunk, ScoredChunk};
use common::storage::types::collection::SearchMode;
use common::utils::embedding::EmbeddingProvider;
use serde_json::Value;
use tracing::{instrument, warn};

use cache::RetrievalCache;
use config::RetrievalTuning;
use modes::ModeInput;
use reranking::RerankerPool;
use scoring::FusedChunk;

const MAX_QUERY_CHARS: usize = 1000;
const MAX_TOP_K: usize = 100;

#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub query: String,
    pub mode: SearchMode,
    pub top_k: usize,
    pub owner: String,
    pub collection: Option<String>,
    pub metadata_filter: HashMap<String, Value>,
    pub rerank: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalDiagnostics {
    pub mode_used: SearchMode,
    pub cache_hit: bool,
    pub reranked: bool,
}

#[derive(Debug, Clone)]
pub struct RetrievalResponse {
    pub results: Vec<RetrievedChunk>,
    pub total_results: usize,
    pub diagnostics: RetrievalDiagnostics,
}

/// Primary orchestrator for §4.2/§4.3: validates the request, resolves
/// (and caches) the query embedding, dispatches to the requested search
/// mode, optionally reranks, and caches the fused result set.
pub struct RetrievalEngine {
    db: SurrealDbClient,
    embedding: EmbeddingProvider,
    cache: RetrievalCache,
    reranker: Option<Arc<RerankerPool>>,
    tuning: RetrievalTuning,
}

impl RetrievalEngine {
    pub fn new(
        db: SurrealDbClient,
        embedding: EmbeddingProvider,
        cache: RetrievalCache,
        reranker: Option<Arc<RerankerPool>>,
        tuning: RetrievalTuning,
    ) -> Self {
        Self {
            db,
            embedding,
            cache,
            reranker,
            tuning,
        }
    }

    #[instrument(skip_all, fields(owner = %request.owner, mode = ?request.mode, top_k = request.top_k))]
    pub async fn retrieve(&self, request: RetrievalRequest) -> Result<RetrievalResponse, AppError> {
        validate_request(&request)?;
        filter::validate_metadata_filter(&request.metadata_filter, &self.tuning.metadata_filter_whitelist)?;

        let search_key = RetrievalCache::search_key(
            &request.owner,
            request.collection.as_deref(),
            request.mode,
            request.top_k,
            request.rerank,
            &request.query,
            &request.metadata_filter,
        );

        if let Some(cached) = self.cache.get_search(&search_key).await {
            if let Some(results) = self.hydrate_cached(&cached).await? {
                let total_results = results.len();
                return Ok(RetrievalResponse {
                    results,
                    total_results,
                    diagnostics: RetrievalDiagnostics {
                        mode_used: request.mode,
                        cache_hit: true,
                        reranked: request.rerank,
                    },
                });
            }
        }

        let candidate_k = if request.rerank {
            (request.top_k * self.tuning.rerank_candidate_multiplier.max(1)).min(MAX_TOP_K)
        } else {
            request.top_k
        };

        let embedding = if mode_needs_embedding(request.mode) {
            Some(self.resolve_embedding(&request.query).await?)
        } else {
            None
        };

        let input = ModeInput {
            db: &self.db,
            owner: &request.owner,
            collection: request.collection.as_deref(),
            query: &request.query,
            embedding: embedding.as_deref(),
            top_k: candidate_k,
            metadata_filter: &request.metadata_filter,
        };

        let mut fused = self.run_mode(&input, request.mode).await?;

        let reranked = request.rerank && self.apply_reranking(&request.query, &mut fused).await;
        fused.truncate(request.top_k);

        self.cache.set_search(&search_key, &fused).await;

        let total_results = fused.len();
        let results = fused
            .into_iter()
            .map(|f| RetrievedChunk {
                chunk: f.chunk,
                score: f.score,
            })
            .collect();

        Ok(RetrievalResponse {
            results,
            total_results,
            diagnostics: RetrievalDiagnostics {
                mode_used: request.mode,
                cache_hit: false,
                reranked,
            },
        })
    }

    /// §4.3 invalidation hook: callers invoke this on document completed /
    /// updated / deleted, and on collection deletion.
    pub async fn invalidate_owner(&self, owner: &str) {
        self.cache.invalidate_owner(owner).await;
    }

    async fn resolve_embedding(&self, query: &str) -> Result<Vec<f32>, AppError> {
        let key = RetrievalCache::embedding_key(self.embedding.model(), query);
        if let Some(cached) = self.cache.get_embedding(&key).await {
            return Ok(cached);
        }
        let embedding = self.embedding.embed_one(query.to_string()).await?;
        self.cache.set_embedding(&key, &embedding).await;
        Ok(embedding)
    }

    async fn run_mode(&self, input: &ModeInput<'_>, mode: SearchMode) -> Result<Vec<FusedChunk>, AppError> {
        match mode {
            SearchMode::Semantic => Ok(as_fused(modes::semantic::search(input).await?)),
            SearchMode::Keyword => Ok(as_fused(modes::keyword::search(input).await?)),
            SearchMode::Hybrid => modes::hybrid::search(input, self.tuning.rrf_k).await,
            SearchMode::Hierarchical => Ok(as_fused(
                modes::hierarchical::search(input, self.tuning.hierarchical_document_fanout).await?,
            )),
            SearchMode::Graph => Ok(as_fused(
                modes::graph::search(
                    input,
                    self.tuning.graph_seed_limit,
                    self.tuning.graph_neighbor_limit,
                    self.tuning.graph_score_decay,
                )
                .await?,
            )),
        }
    }

    /// §4.2: "Rerank failure is logged and the unreranked list is returned
    /// (degrade, don't fail the request)." Returns whether reranking
    /// actually happened, for diagnostics.
    async fn apply_reranking(&self, query: &str, fused: &mut [FusedChunk]) -> bool {
        let Some(pool) = &self.reranker else {
            return false;
        };
        if fused.is_empty() {
            return false;
        }

        let lease = pool.checkout().await;
        let documents: Vec<String> = fused.iter().map(|f| f.chunk.content.clone()).collect();
        match lease.rerank(query, documents).await {
            Ok(results) => {
                let mut new_order: Vec<FusedChunk> = Vec::with_capacity(results.len());
                for result in results {
                    if let Some(item) = fused.get(result.index) {
                        new_order.push(FusedChunk {
                            chunk: item.chunk.clone(),
                            score: result.score,
                        });
                    }
                }
                if new_order.len() == fused.len() {
                    fused.clone_from_slice(&new_order);
                    true
                } else {
                    warn!("reranker returned a mismatched result count, keeping original order");
                    false
                }
            }
            Err(err) => {
                warn!(%err, "rerank failed, falling back to unreranked order");
                false
            }
        }
    }

    async fn hydrate_cached(
        &self,
        cached: &[cache::CachedChunk],
    ) -> Result<Option<Vec<RetrievedChunk>>, AppError> {
        let mut results = Vec::with_capacity(cached.len());
        for entry in cached {
            if let Some(chunk) = self.db.get_item::<Chunk>(&entry.chunk_id).await? {
                results.push(RetrievedChunk {
                    chunk,
                    score: entry.score,
                });
            }
        }
        Ok(Some(results))
    }
}

fn mode_needs_embedding(mode: SearchMode) -> bool {
    !matches!(mode, SearchMode::Keyword)
}

fn as_fused(scored: Vec<ScoredChunk>) -> Vec<FusedChunk> {
    scored
        .into_iter()
        .map(|s| FusedChunk {
            chunk: s.chunk,
            score: s.score,
        })
        .collect()
}

fn validate_request(request: &RetrievalRequest) -> Result<(), AppError> {
    let query_len = request.query.chars().count();
    if query_len == 0 || query_len > MAX_QUERY_CHARS {
        return Err(AppError::Validation(format!(
            "query must be 1..{MAX_QUERY_CHARS} characters, got {query_len}"
        )));
    }
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(AppError::Validation(format!(
            "top_k must be 1..{MAX_TOP_K}, got {}",
            request.top_k
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::cache::InMemoryCache;
    use common::utils::config::AppConfig;
    use std::time::Duration;
    use uuid::Uuid;

    fn tuning(whitelist: Vec<String>) -> RetrievalTuning {
        RetrievalTuning {
            rrf_k: 60.0,
            default_top_k: 5,
            hierarchical_document_fanout: 3,
            graph_seed_limit: 5,
            graph_neighbor_limit: 6,
            graph_score_decay: 0.75,
            rerank_candidate_multiplier: 2,
            metadata_filter_whitelist: whitelist,
            search_cache_ttl_secs: 900,
            embedding_cache_ttl_secs: 86_400,
        }
    }

    async fn engine(whitelist: Vec<String>) -> (RetrievalEngine, SurrealDbClient) {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");
        let config = AppConfig::load().expect("defaults");
        let embedding = EmbeddingProvider::new(&config);
        let cache = RetrievalCache::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(900),
            Duration::from_secs(86_400),
        );
        let engine = RetrievalEngine::new(db.clone(), embedding, cache, None, tuning(whitelist));
        (engine, db)
    }

    #[tokio::test]
    async fn empty_candidate_set_is_not_an_error() {
        let (engine, _db) = engine(vec![]).await;
        let response = engine
            .retrieve(RetrievalRequest {
                query: "nothing stored yet".to_string(),
                mode: SearchMode::Keyword,
                top_k: 5,
                owner: "owner-1".to_string(),
                collection: None,
                metadata_filter: HashMap::new(),
                rerank: false,
            })
            .await
            .expect("retrieve should succeed with zero candidates");
        assert_eq!(response.total_results, 0);
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn metadata_filter_matching_nothing_is_not_an_error() {
        let (engine, db) = engine(vec!["category".to_string()]).await;
        let chunk = Chunk::new(
            "doc-1".to_string(),
            "owner-1".to_string(),
            "collection-1".to_string(),
            0,
            "Kubernetes orchestration".to_string(),
            vec![0.1, 0.2, 0.3],
            5,
            None,
            None,
            HashMap::new(),
        );
        db.store_item(chunk).await.expect("store chunk");

        let mut filter = HashMap::new();
        filter.insert("category".to_string(), Value::String("unmatched".to_string()));

        let response = engine
            .retrieve(RetrievalRequest {
                query: "Kubernetes".to_string(),
                mode: SearchMode::Keyword,
                top_k: 5,
                owner: "owner-1".to_string(),
                collection: None,
                metadata_filter: filter,
                rerank: false,
            })
            .await
            .expect("retrieve should succeed even with no filter matches");
        assert_eq!(response.total_results, 0);
    }

    #[tokio::test]
    async fn rejects_metadata_filter_keys_outside_the_whitelist() {
        let (engine, _db) = engine(vec!["category".to_string()]).await;
        let mut filter = HashMap::new();
        filter.insert("secret".to_string(), Value::String("x".to_string()));

        let err = engine
            .retrieve(RetrievalRequest {
                query: "hello".to_string(),
                mode: SearchMode::Keyword,
                top_k: 5,
                owner: "owner-1".to_string(),
                collection: None,
                metadata_filter: filter,
                rerank: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter(_)));
    }

    #[tokio::test]
    async fn repeat_request_is_served_from_cache() {
        let (engine, db) = engine(vec![]).await;
        let chunk = Chunk::new(
            "doc-1".to_string(),
            "owner-1".to_string(),
            "collection-1".to_string(),
            0,
            "Kubernetes orchestration at scale".to_string(),
            vec![0.1, 0.2, 0.3],
            5,
            None,
            None,
            HashMap::new(),
        );
        db.store_item(chunk.clone()).await.expect("store chunk");

        let request = || RetrievalRequest {
            query: "Kubernetes orchestration".to_string(),
            mode: SearchMode::Keyword,
            top_k: 5,
            owner: "owner-1".to_string(),
            collection: None,
            metadata_filter: HashMap::new(),
            rerank: false,
        };

        let first = engine.retrieve(request()).await.expect("first retrieve");
        assert!(!first.diagnostics.cache_hit);
        assert_eq!(first.total_results, 1);

        let second = engine.retrieve(request()).await.expect("second retrieve");
        assert!(second.diagnostics.cache_hit);
        assert_eq!(second.total_results, 1);
        assert_eq!(second.results[0].chunk.id, chunk.id);
    }

    #[tokio::test]
    async fn invalidate_owner_clears_the_search_cache_for_that_owner() {
        let (engine, db) = engine(vec![]).await;
        let chunk = Chunk::new(
            "doc-1".to_string(),
            "owner-1".to_string(),
            "collection-1".to_string(),
            0,
            "Kubernetes orchestration".to_string(),
            vec![0.1, 0.2, 0.3],
            5,
            None,
            None,
            HashMap::new(),
        );
        db.store_item(chunk).await.expect("store chunk");

        let request = || RetrievalRequest {
            query: "Kubernetes orchestration".to_string(),
            mode: SearchMode::Keyword,
            top_k: 5,
            owner: "owner-1".to_string(),
            collection: None,
            metadata_filter: HashMap::new(),
            rerank: false,
        };

        engine.retrieve(request()).await.expect("first retrieve");
        engine.invalidate_owner("owner-1").await;
        let after = engine.retrieve(request()).await.expect("second retrieve");
        assert!(!after.diagnostics.cache_hit);
    }

    #[test]
    fn rejects_empty_query() {
        let request = RetrievalRequest {
            query: String::new(),
            mode: SearchMode::Semantic,
            top_k: 5,
            owner: "owner-1".to_string(),
            collection: None,
            metadata_filter: HashMap::new(),
            rerank: false,
        };
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn rejects_top_k_out_of_bounds() {
        let request = RetrievalRequest {
            query: "hello".to_string(),
            mode: SearchMode::Semantic,
            top_k: 0,
            owner: "owner-1".to_string(),
            collection: None,
            metadata_filter: HashMap::new(),
            rerank: false,
        };
        assert!(validate_request(&request).is_err());

        let request = RetrievalRequest {
            top_k: 101,
            ..request
        };
        assert!(validate_request(&request).is_err());
    }

    #[test]
    fn accepts_a_well_formed_request() {
        let request = RetrievalRequest {
            query: "hello world".to_string(),
            mode: SearchMode::Keyword,
            top_k: 10,
            owner: "owner-1".to_string(),
            collection: None,
            metadata_filter: HashMap::new(),
            rerank: false,
        };
        assert!(validate_request(&request).is_ok());
    }
}
