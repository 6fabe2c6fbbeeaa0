use common::utils::config::AppConfig;

/// Tuning knobs for the retrieval engine, derived from `AppConfig` at
/// startup. Mirrors the pattern in `ingestion-pipeline::pipeline::config`:
/// a small explicit struct rather than threading `AppConfig` through every
/// stage, so stages stay unit-testable with small fixtures.
#[derive(Debug, Clone)]
pub struct RetrievalTuning {
    pub rrf_k: f32,
    pub default_top_k: usize,
    pub hierarchical_document_fanout: usize,
    pub graph_seed_limit: usize,
    pub graph_neighbor_limit: usize,
    pub graph_score_decay: f32,
    pub rerank_candidate_multiplier: usize,
    pub metadata_filter_whitelist: Vec<String>,
    pub search_cache_ttl_secs: u64,
    pub embedding_cache_ttl_secs: u64,
}

impl From<&AppConfig> for RetrievalTuning {
    fn from(config: &AppConfig) -> Self {
        Self {
            rrf_k: config.rrf_k,
            default_top_k: config.chat_default_top_k,
            hierarchical_document_fanout: 5,
            graph_seed_limit: 5,
            graph_neighbor_limit: 6,
            graph_score_decay: 0.75,
            rerank_candidate_multiplier: 2,
            metadata_filter_whitelist: config.metadata_filter_whitelist.clone(),
            search_cache_ttl_secs: config.search_cache_ttl_secs,
            embedding_cache_ttl_secs: config.embedding_cache_ttl_secs,
        }
    }
}
