use std::collections::HashSet;

use common::error::AppError;
use common::storage::types::chunk::ScoredChunk;

use super::{semantic, ModeInput};

/// §4.2 hierarchical: rank documents by their best chunk score, keep the
/// top `document_fanout` documents, then return only chunks within those
/// documents (already ranked by the same semantic candidate pool).
pub async fn search(
    input: &ModeInput<'_>,
    document_fanout: usize,
) -> Result<Vec<ScoredChunk>, AppError> {
    let candidate_k = input.top_k.saturating_mul(document_fanout.max(1)).max(input.top_k);
    let wide_input = ModeInput {
        top_k: candidate_k,
        db: input.db,
        owner: input.owner,
        collection: input.collection,
        query: input.query,
        embedding: input.embedding,
        metadata_filter: input.metadata_filter,
    };

    let candidates = semantic::search(&wide_input).await?;
    let top_documents = top_documents_by_best_score(&candidates, document_fanout);

    let mut filtered: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| top_documents.contains(&c.chunk.document))
        .collect();
    filtered.truncate(input.top_k);
    Ok(filtered)
}

fn top_documents_by_best_score(candidates: &[ScoredChunk], fanout: usize) -> HashSet<String> {
    let mut best_per_document: Vec<(String, f32)> = Vec::new();
    for candidate in candidates {
        match best_per_document
            .iter_mut()
            .find(|(doc, _)| *doc == candidate.chunk.document)
        {
            Some((_, score)) if candidate.score > *score => *score = candidate.score,
            Some(_) => {}
            None => best_per_document.push((candidate.chunk.document.clone(), candidate.score)),
        }
    }
    best_per_document.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    best_per_document
        .into_iter()
        .take(fanout)
        .map(|(doc, _)| doc)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk::Chunk;
    use std::collections::HashMap;

    fn chunk_score(document: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(
                document.to_string(),
                "owner-1".to_string(),
                "collection-1".to_string(),
                0,
                "content".to_string(),
                vec![0.1],
                1,
                None,
                None,
                HashMap::new(),
            ),
            score,
        }
    }

    #[test]
    fn keeps_only_the_top_fanout_documents_best_scores() {
        let candidates = vec![
            chunk_score("doc-a", 0.9),
            chunk_score("doc-b", 0.8),
            chunk_score("doc-c", 0.2),
        ];
        let top = top_documents_by_best_score(&candidates, 2);
        assert!(top.contains("doc-a"));
        assert!(top.contains("doc-b"));
        assert!(!top.contains("doc-c"));
    }
}
