use bytes::Bytes;
use common::error::AppError;
use tracing::instrument;

use crate::pipeline::context::PipelineContext;

/// §4.1 stage 1: read the original bytes from the blob store. The attempt
/// starts in `Fetched` already (§4.1's typestate has no separate pre-fetch
/// state), so this stage does its work without touching the machine.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id))]
pub async fn run(ctx: &PipelineContext) -> Result<Bytes, AppError> {
    ctx.services.storage.get(&ctx.payload.blob_key).await
}
