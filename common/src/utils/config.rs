use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

fn default_http_port() -> u16 {
    8080
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_surrealdb_address() -> String {
    "mem://".to_string()
}
fn default_surrealdb_username() -> String {
    "root".to_string()
}
fn default_surrealdb_password() -> String {
    "root".to_string()
}
fn default_surrealdb_namespace() -> String {
    "mnemosyne".to_string()
}
fn default_surrealdb_database() -> String {
    "core".to_string()
}
fn default_blob_store_root() -> String {
    "./data/blobs".to_string()
}
fn default_blob_signing_secret() -> String {
    "change-me-in-production".to_string()
}
fn default_signed_url_max_ttl_secs() -> i64 {
    24 * 60 * 60
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dimension() -> usize {
    1536
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_chat_default_top_k() -> usize {
    5
}
fn default_chat_history_window() -> usize {
    10
}
fn default_chat_default_mode() -> String {
    "hybrid".to_string()
}
fn default_search_cache_ttl_secs() -> u64 {
    15 * 60
}
fn default_embedding_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}
fn default_reranking_pool_size() -> usize {
    2
}
fn default_fastembed_cache_dir() -> String {
    "./data/fastembed-cache".to_string()
}
fn default_ingest_max_body_bytes() -> usize {
    50 * 1024 * 1024
}
fn default_ingest_retry_base_delay_secs() -> u64 {
    60
}
fn default_ingest_retry_max_delay_secs() -> u64 {
    900
}
fn default_ingest_max_attempts() -> u32 {
    3
}
fn default_ingest_embed_batch_size() -> usize {
    100
}
fn default_ingest_embed_batch_timeout_secs() -> u64 {
    300
}
fn default_ingest_worker_count() -> usize {
    8
}
fn default_llm_timeout_secs() -> u64 {
    600
}
fn default_retrieval_timeout_secs() -> u64 {
    30
}
fn default_cache_timeout_secs() -> u64 {
    1
}
fn default_rrf_k() -> f32 {
    60.0
}
fn default_metadata_filter_whitelist() -> Vec<String> {
    vec![
        "category".to_string(),
        "source".to_string(),
        "language".to_string(),
        "page".to_string(),
    ]
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}

/// Loaded once at process startup (both `server` and `worker` binaries) and
/// cloned into every state struct that needs it. No process-wide mutable
/// singleton, per §9's redesign note.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_username")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_password")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,

    #[serde(default)]
    pub blob_store_kind: BlobStoreKind,
    #[serde(default = "default_blob_store_root")]
    pub blob_store_root: String,
    #[serde(default = "default_blob_signing_secret")]
    pub blob_signing_secret: String,
    #[serde(default = "default_signed_url_max_ttl_secs")]
    pub signed_url_max_ttl_secs: i64,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(default)]
    pub embedding_base_url: Option<String>,
    #[serde(default)]
    pub embedding_api_key: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_base_url: Option<String>,
    #[serde(default)]
    pub llm_api_key: String,

    #[serde(default = "default_chat_default_top_k")]
    pub chat_default_top_k: usize,
    #[serde(default = "default_chat_history_window")]
    pub chat_history_window: usize,
    #[serde(default = "default_chat_default_mode")]
    pub chat_default_mode: String,

    #[serde(default = "default_search_cache_ttl_secs")]
    pub search_cache_ttl_secs: u64,
    #[serde(default = "default_embedding_cache_ttl_secs")]
    pub embedding_cache_ttl_secs: u64,

    #[serde(default = "default_false")]
    pub reranking_enabled: bool,
    #[serde(default = "default_reranking_pool_size")]
    pub reranking_pool_size: usize,
    #[serde(default = "default_fastembed_cache_dir")]
    pub fastembed_cache_dir: String,

    #[serde(default = "default_ingest_max_body_bytes")]
    pub ingest_max_body_bytes: usize,
    #[serde(default = "default_ingest_retry_base_delay_secs")]
    pub ingest_retry_base_delay_secs: u64,
    #[serde(default = "default_ingest_retry_max_delay_secs")]
    pub ingest_retry_max_delay_secs: u64,
    #[serde(default = "default_ingest_max_attempts")]
    pub ingest_max_attempts: u32,
    #[serde(default = "default_ingest_embed_batch_size")]
    pub ingest_embed_batch_size: usize,
    #[serde(default = "default_ingest_embed_batch_timeout_secs")]
    pub ingest_embed_batch_timeout_secs: u64,
    #[serde(default = "default_ingest_worker_count")]
    pub ingest_worker_count: usize,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_retrieval_timeout_secs")]
    pub retrieval_timeout_secs: u64,
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,

    #[serde(default = "default_metadata_filter_whitelist")]
    pub metadata_filter_whitelist: Vec<String>,

    #[serde(default = "default_true")]
    pub registration_enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlobStoreKind {
    #[default]
    Memory,
    Local,
}

impl AppConfig {
    pub fn load() -> Result<Self, AppError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::default().separator("__"))
            .build()
            .map_err(|e| AppError::InternalError(format!("config error: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::InternalError(format!("config error: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_an_environment() {
        let config = AppConfig::load().expect("defaults should be sufficient");
        assert_eq!(config.rrf_k, 60.0);
        assert_eq!(config.ingest_max_attempts, 3);
        assert_eq!(
            config.metadata_filter_whitelist,
            vec!["category", "source", "language", "page"]
        );
    }
}
