use common::error::AppError;
use common::storage::types::chunk::{Chunk, ScoredChunk};

use super::ModeInput;

/// §4.2 semantic search: ANN query against the chunk embedding index,
/// `score = 1 - distance` (the HNSW cosine index already returns cosine
/// similarity directly, so no distance inversion is needed here).
pub async fn search(input: &ModeInput<'_>) -> Result<Vec<ScoredChunk>, AppError> {
    let embedding = input.embedding.ok_or_else(|| {
        AppError::Validation("semantic search requires a query embedding".into())
    })?;
    if embedding.is_empty() {
        return Err(AppError::Validation(
            "query embedding must not be empty".into(),
        ));
    }
    Chunk::vector_search(
        input.db,
        input.owner,
        input.collection,
        embedding,
        input.top_k,
        input.metadata_filter,
    )
    .await
}
