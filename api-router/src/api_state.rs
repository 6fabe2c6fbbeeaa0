use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::Client as OpenAiClient;
use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::store::StorageManager;
use common::utils::cache::InMemoryCache;
use common::utils::config::AppConfig;
use common::utils::embedding::EmbeddingProvider;
use retrieval_pipeline::cache::RetrievalCache;
use retrieval_pipeline::config::RetrievalTuning;
use retrieval_pipeline::reranking::RerankerPool;
use retrieval_pipeline::RetrievalEngine;
use tokio::sync::Mutex as AsyncMutex;

/// A held lock keeps a chat session's turns serialized (§5: "a second
/// concurrent turn on the same session must be rejected or queued"). The
/// registry below hands one of these out per session id; callers try-lock
/// it and hold the guard for the whole turn, including the streaming
/// phase, so it releases on completion *or* on client disconnect.
pub type SessionLock = Arc<AsyncMutex<()>>;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub storage: StorageManager,
    pub retrieval: Arc<RetrievalEngine>,
    pub llm_client: OpenAiClient<OpenAIConfig>,
    session_locks: Arc<AsyncMutex<HashMap<String, SessionLock>>>,
}

impl ApiState {
    /// Returns the mutex guarding `session_id`'s turns, creating it on
    /// first use. The registry itself never shrinks — sessions are cheap
    /// and long-lived enough that this isn't worth evicting.
    pub async fn session_lock(&self, session_id: &str) -> SessionLock {
        let mut locks = self.session_locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl ApiState {
    pub async fn new(config: &AppConfig, storage: StorageManager) -> Result<Self, AppError> {
        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        db.ensure_initialized(config.embedding_dimension).await?;

        let embedding = EmbeddingProvider::new(config);
        let cache = RetrievalCache::new(
            Arc::new(InMemoryCache::new()),
            Duration::from_secs(config.search_cache_ttl_secs),
            Duration::from_secs(config.embedding_cache_ttl_secs),
        );
        let reranker = RerankerPool::maybe_from_config(config)?;
        let tuning = RetrievalTuning::from(config);
        let retrieval = Arc::new(RetrievalEngine::new((*db).clone(), embedding, cache, reranker, tuning));

        let mut llm_config = OpenAIConfig::new().with_api_key(&config.llm_api_key);
        if let Some(base_url) = &config.llm_base_url {
            llm_config = llm_config.with_api_base(base_url);
        }
        let llm_client = OpenAiClient::with_config(llm_config);

        Ok(Self {
            db,
            config: config.clone(),
            storage,
            retrieval,
            llm_client,
            session_locks: Arc::new(AsyncMutex::new(HashMap::new())),
        })
    }
}
