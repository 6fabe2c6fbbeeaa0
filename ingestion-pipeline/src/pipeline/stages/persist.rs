use common::error::AppError;
use common::storage::types::chunk::Chunk;
use common::storage::types::document::{Document, ProcessingInfo};
use common::storage::types::knowledge_entity::KnowledgeEntity;
use common::storage::types::knowledge_relationship::KnowledgeRelationship;
use tracing::instrument;

use super::map_guard_error;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::state::{Embedded, IngestionMachine, Persisted};

/// §4.1 stage 6: atomically swap the document's chunk set, then flip the
/// document to `completed`. `replace_for_document` deletes any chunks a
/// prior attempt left before writing the fresh set.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id))]
pub async fn run(
    machine: IngestionMachine<(), Embedded>,
    ctx: &mut PipelineContext,
) -> Result<IngestionMachine<(), Persisted>, AppError> {
    let chunks: Vec<Chunk> = ctx.take_chunks()?;
    let chunk_count = chunks.len() as u32;
    let total_tokens = ctx.total_tokens;

    Chunk::replace_for_document(&ctx.services.db, &ctx.payload.document_id, chunks).await?;
    KnowledgeEntity::replace_for_document(
        &ctx.services.db,
        &ctx.payload.document_id,
        std::mem::take(&mut ctx.entities),
    )
    .await?;
    KnowledgeRelationship::replace_for_document(
        &ctx.services.db,
        &ctx.payload.document_id,
        std::mem::take(&mut ctx.relationships),
    )
    .await?;

    let parsed = ctx.parsed()?;
    let processing_info = ProcessingInfo {
        parser: Some(parsed.parser.to_string()),
        embedding_model: Some(ctx.services.embedding.model().to_string()),
        parse_ms: None,
        embed_ms: None,
        error_code: None,
        error_message: None,
    };

    let updated = Document::mark_completed(
        &ctx.services.db,
        &ctx.payload.document_id,
        chunk_count,
        total_tokens,
        processing_info,
    )
    .await?;

    if updated.is_none() {
        return Err(AppError::InternalError(
            "document was not in the running state at persist time".into(),
        ));
    }

    machine
        .persist()
        .map_err(|(_, guard)| map_guard_error("persist", &guard))
}
