use std::collections::HashMap;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::storage::types::api_key::ApiKey;
use common::storage::types::collection::SearchMode;
use retrieval_pipeline::{RetrievalRequest, RetrievedChunk};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RetrievalApiRequest {
    pub query: String,
    #[serde(default)]
    pub mode: Option<SearchMode>,
    #[serde(default)]
    pub top_k: Option<usize>,
    pub collection_id: Option<String>,
    #[serde(default)]
    pub metadata_filter: HashMap<String, Value>,
    #[serde(default)]
    pub rerank: bool,
}

#[derive(Debug, Serialize)]
struct RetrievedChunkResponse {
    chunk_id: String,
    document_id: String,
    content: String,
    score: f32,
}

impl From<RetrievedChunk> for RetrievedChunkResponse {
    fn from(value: RetrievedChunk) -> Self {
        Self {
            chunk_id: value.chunk.id,
            document_id: value.chunk.document,
            content: value.chunk.content,
            score: value.score,
        }
    }
}

/// `POST /retrievals` (§6, C4/C5): a single owner-scoped search, the same
/// engine the chat orchestrator uses internally.
pub async fn create(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Json(input): Json<RetrievalApiRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = input.mode.unwrap_or(SearchMode::Hybrid);
    let top_k = input.top_k.unwrap_or(state.config.chat_default_top_k);

    let response = state
        .retrieval
        .retrieve(RetrievalRequest {
            query: input.query,
            mode,
            top_k,
            owner: key.owner.clone(),
            collection: input.collection_id,
            metadata_filter: input.metadata_filter,
            rerank: input.rerank,
        })
        .await
        .map_err(ApiError::from)?;

    let results: Vec<RetrievedChunkResponse> = response.results.into_iter().map(Into::into).collect();
    Ok(Json(serde_json::json!({
        "results": results,
        "total_results": response.total_results,
        "mode_used": response.diagnostics.mode_used,
        "cache_hit": response.diagnostics.cache_hit,
        "reranked": response.diagnostics.reranked,
    })))
}
