use common::error::AppError;
use common::storage::types::chunk::{Chunk, ScoredChunk};

use super::ModeInput;

/// §4.2 keyword (lexical) search: BM25-style full-text match. The query
/// text is sanitized before it reaches the search engine so a caller can't
/// smuggle SurrealDB's full-text operators (`@@`, boosts) through as a
/// literal search term.
pub async fn search(input: &ModeInput<'_>) -> Result<Vec<ScoredChunk>, AppError> {
    let sanitized = sanitize_query(input.query);
    if sanitized.is_empty() {
        return Ok(Vec::new());
    }
    Chunk::fts_search(
        input.db,
        input.owner,
        input.collection,
        &sanitized,
        input.top_k,
        input.metadata_filter,
    )
    .await
}

fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_control_operators() {
        assert_eq!(sanitize_query("rust && async || panic"), "rust async panic");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_query("  hello   world  "), "hello world");
    }
}
