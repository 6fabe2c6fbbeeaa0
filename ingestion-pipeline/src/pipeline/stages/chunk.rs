use std::collections::HashMap;
use std::sync::OnceLock;

use common::error::AppError;
use common::storage::types::chunk::Chunk;
use text_splitter::{ChunkCapacity, ChunkConfig, TextSplitter};
use tracing::instrument;

use super::map_guard_error;
use crate::pipeline::context::PipelineContext;
use crate::pipeline::state::{Chunked, Enriched, IngestionMachine};

/// §4.1 stage 4: token-bounded splitting of the canonical text. Chunks are
/// built here with an empty embedding; the `embed` stage fills it in.
#[instrument(skip_all, fields(document_id = %ctx.payload.document_id))]
pub async fn run(
    machine: IngestionMachine<(), Enriched>,
    ctx: &mut PipelineContext,
) -> Result<IngestionMachine<(), Chunked>, AppError> {
    let text = ctx.parsed()?.text.clone();
    let candidates = split_into_chunks(
        &text,
        ctx.tuning.chunk_size_tokens,
        ctx.tuning.chunk_overlap_tokens,
    )?;

    let chunks = candidates
        .into_iter()
        .enumerate()
        .map(|(index, (content, token_count))| {
            ctx.total_tokens += token_count as u64;
            Chunk::new(
                ctx.payload.document_id.clone(),
                ctx.payload.owner.clone(),
                ctx.payload.collection_id.clone(),
                index as u32,
                content,
                Vec::new(),
                token_count,
                None,
                None,
                HashMap::new(),
            )
        })
        .collect();

    ctx.chunks = Some(chunks);

    machine
        .chunk()
        .map_err(|(_, guard)| map_guard_error("chunk", &guard))
}

fn split_into_chunks(
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Result<Vec<(String, u32)>, AppError> {
    if max_tokens == 0 {
        return Err(AppError::Validation(
            "chunk_size_tokens must be greater than zero".into(),
        ));
    }
    if overlap_tokens >= max_tokens {
        return Err(AppError::Validation(format!(
            "chunk_size_tokens must be greater than the configured overlap of {overlap_tokens}"
        )));
    }

    let tokenizer = get_tokenizer()?;
    let chunk_capacity = ChunkCapacity::new(max_tokens)
        .map_err(|e| AppError::Validation(format!("invalid chunk token bounds: {e}")))?;
    let chunk_config = ChunkConfig::new(chunk_capacity)
        .with_overlap(overlap_tokens)
        .map_err(|e| AppError::Validation(format!("invalid chunk overlap: {e}")))?
        .with_sizer(tokenizer);
    let splitter = TextSplitter::new(chunk_config);

    let mut chunks: Vec<(String, u32)> = splitter
        .chunks(text)
        .map(|chunk| (chunk.to_owned(), tokenizer.encode(chunk, false).map(|e| e.len()).unwrap_or(0) as u32))
        .collect();
    if chunks.is_empty() {
        chunks.push((String::new(), 0));
    }
    Ok(chunks)
}

fn get_tokenizer() -> Result<&'static tokenizers::Tokenizer, AppError> {
    static TOKENIZER: OnceLock<Result<tokenizers::Tokenizer, String>> = OnceLock::new();
    match TOKENIZER.get_or_init(|| {
        tokenizers::Tokenizer::from_pretrained("bert-base-cased", None)
            .map_err(|e| format!("failed to initialize tokenizer: {e}"))
    }) {
        Ok(tokenizer) => Ok(tokenizer),
        Err(err) => Err(AppError::InternalError(err.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let err = split_into_chunks("hello world", 50, 50).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = split_into_chunks("hello world", 0, 0).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
