use common::error::AppError;

use super::{keyword, semantic, ModeInput};
use crate::scoring::{reciprocal_rank_fusion, FusedChunk};

/// §4.2 hybrid: run semantic and keyword in parallel, each over `2*top_k`
/// candidates, then fuse with RRF and truncate to `top_k`.
pub async fn search(input: &ModeInput<'_>, rrf_k: f32) -> Result<Vec<FusedChunk>, AppError> {
    let candidate_k = input.top_k.saturating_mul(2).max(1);
    let wide_input = ModeInput {
        top_k: candidate_k,
        ..clone_input(input)
    };

    let (vector_result, keyword_result) =
        tokio::join!(semantic::search(&wide_input), keyword::search(&wide_input));

    let vector_candidates = vector_result?;
    let keyword_candidates = keyword_result?;

    let mut fused = reciprocal_rank_fusion(&[vector_candidates, keyword_candidates], rrf_k);
    fused.truncate(input.top_k);
    Ok(fused)
}

fn clone_input<'a>(input: &ModeInput<'a>) -> ModeInput<'a> {
    ModeInput {
        db: input.db,
        owner: input.owner,
        collection: input.collection,
        query: input.query,
        embedding: input.embedding,
        top_k: input.top_k,
        metadata_filter: input.metadata_filter,
    }
}
