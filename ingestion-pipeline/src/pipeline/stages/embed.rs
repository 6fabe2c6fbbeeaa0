use common::error::AppError;
use tracing::instrument;

use super::map_guard_error;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::state::{Chunked, Embedded, IngestionMachine};

/// §4.1 stage 5: batches chunk content through the embedding provider
/// (batch size bounded by `tuning.embed_batch_size`, timeout per batch by
/// `tuning.embed_batch_timeout_secs`) and writes each vector back onto its
/// chunk. A batch timeout is a transient failure: the attempt fails and,
/// if attempts remain, the whole document is retried from `fetch`.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id))]
pub async fn run(
    machine: IngestionMachine<(), Chunked>,
    ctx: &mut PipelineContext,
) -> Result<IngestionMachine<(), Embedded>, AppError> {
    let mut chunks = ctx.take_chunks()?;
    let batch_size = ctx.tuning.embed_batch_size.max(1);
    let timeout = std::time::Duration::from_secs(ctx.tuning.embed_batch_timeout_secs);

    for batch in chunks.chunks_mut(batch_size) {
        let inputs = batch.iter().map(|c| c.content.clone()).collect();
        let vectors = tokio::time::timeout(timeout, ctx.services.embedding.embed_batch(inputs))
            .await
            .map_err(|_| AppError::TransientUpstream("embedding batch timed out".to_string()))??;

        if vectors.len() != batch.len() {
            return Err(AppError::InternalError(
                "embedding provider returned a different number of vectors than inputs".into(),
            ));
        }
        for (chunk, vector) in batch.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }
    }

    ctx.chunks = Some(chunks);

    machine
        .embed()
        .map_err(|(_, guard)| map_guard_error("embed", &guard))
}
