use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::store::StorageManager;
use common::storage::types::chunk::Chunk;
use common::storage::types::ingestion_payload::IngestionPayload;
use common::storage::types::knowledge_entity::KnowledgeEntity;
use common::storage::types::knowledge_relationship::KnowledgeRelationship;
use common::utils::embedding::EmbeddingProvider;

use super::config::IngestionTuning;
use crate::parsers::ParsedContent;

/// The external collaborators a pipeline run needs, grouped so
/// `IngestionPipeline` can be constructed once per worker and shared
/// across concurrently running jobs (§5: request/ingestion worker
/// populations are disjoint, but ingestion workers share these handles).
pub struct PipelineServices {
    pub db: Arc<SurrealDbClient>,
    pub storage: StorageManager,
    pub embedding: EmbeddingProvider,
    pub openai_client: async_openai::Client<OpenAIConfig>,
}

/// Mutable scratch space threaded through one attempt's stages. Each stage
/// reads what the previous stage wrote and writes its own output; nothing
/// here is persisted until the `persist` stage succeeds.
pub struct PipelineContext {
    pub job_id: String,
    pub attempt: u32,
    pub payload: IngestionPayload,
    pub tuning: IngestionTuning,
    pub services: Arc<PipelineServices>,

    pub parsed: Option<ParsedContent>,
    pub content_hash: Option<String>,
    pub chunks: Option<Vec<Chunk>>,
    pub total_tokens: u64,
    pub entities: Vec<KnowledgeEntity>,
    pub relationships: Vec<KnowledgeRelationship>,
}

impl PipelineContext {
    pub fn new(
        job_id: String,
        attempt: u32,
        payload: IngestionPayload,
        tuning: IngestionTuning,
        services: Arc<PipelineServices>,
    ) -> Self {
        Self {
            job_id,
            attempt,
            payload,
            tuning,
            services,
            parsed: None,
            content_hash: None,
            chunks: None,
            total_tokens: 0,
            entities: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn parsed(&self) -> Result<&ParsedContent, AppError> {
        self.parsed
            .as_ref()
            .ok_or_else(|| AppError::InternalError("parse stage has not run yet".to_string()))
    }

    pub fn take_chunks(&mut self) -> Result<Vec<Chunk>, AppError> {
        self.chunks
            .take()
            .ok_or_else(|| AppError::InternalError("chunk stage has not run yet".to_string()))
    }

    /// Logs and passes through an error from any stage; the caller maps
    /// this into the document's `failed` transition or a retry per §4.1.
    pub fn abort(&self, err: AppError) -> AppError {
        tracing::warn!(job_id = %self.job_id, document_id = %self.payload.document_id, attempt = self.attempt, error = %err, "ingestion attempt aborted");
        err
    }
}
