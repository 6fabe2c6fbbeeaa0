use common::error::AppError;
use common::storage::store::content_hash;
use common::storage::types::document::Document;
use tracing::instrument;

use super::map_guard_error;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::state::{Deduplicated, IngestionMachine, Parsed};

/// §4.1 stage 3: content-hash the canonical text and fail the document as
/// a duplicate if another *completed* document of this owner already has
/// the same hash. The `(owner, content_hash)` uniqueness is additionally
/// enforced at the store level (§3), so a race between two concurrent
/// first-time uploads still can't leave two completed duplicates.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id))]
pub async fn run(
    machine: IngestionMachine<(), Parsed>,
    ctx: &mut PipelineContext,
) -> Result<IngestionMachine<(), Deduplicated>, AppError> {
    let text = ctx.parsed()?.text.clone();
    let hash = content_hash(text.as_bytes());

    if let Some(existing) =
        Document::find_by_owner_and_hash(&ctx.services.db, &ctx.payload.owner, &hash).await?
    {
        if existing.id != ctx.payload.document_id {
            return Err(AppError::Duplicate {
                existing_id: existing.id,
                message: "a completed document with this content already exists".to_string(),
            });
        }
    }

    ctx.content_hash = Some(hash);

    machine
        .dedupe()
        .map_err(|(_, guard)| map_guard_error("dedupe", &guard))
}
