use std::cmp::Ordering;
use std::collections::HashMap;

use common::storage::types::chunk::{Chunk, ScoredChunk};

/// A chunk plus its accumulated Reciprocal Rank Fusion score.
#[derive(Debug, Clone)]
pub struct FusedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// §4.2 hybrid mode: `score += 1 / (k + rank)` for each list a candidate
/// appears in, rank being 1-based. A chunk present in both lists
/// accumulates both contributions — this is a straight RRF, not the
/// weighted linear combination some retrieval stacks use, since the spec
/// names the formula explicitly.
pub fn reciprocal_rank_fusion(lists: &[Vec<ScoredChunk>], k: f32) -> Vec<FusedChunk> {
    let mut fused: HashMap<String, FusedChunk> = HashMap::new();

    for list in lists {
        for (index, scored) in list.iter().enumerate() {
            let rank = (index + 1) as f32;
            let contribution = 1.0 / (k + rank);
            fused
                .entry(scored.chunk.id.clone())
                .and_modify(|entry| entry.score += contribution)
                .or_insert_with(|| FusedChunk {
                    chunk: scored.chunk.clone(),
                    score: contribution,
                });
        }
    }

    let mut results: Vec<FusedChunk> = fused.into_values().collect();
    sort_by_score_desc(&mut results);
    results
}

/// §4.2 tie-break: equal scores break ties by `(document_id, chunk_index)`
/// lexicographically, for determinism across runs.
pub fn sort_by_score_desc(results: &mut [FusedChunk]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk.document.cmp(&b.chunk.document))
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn chunk(document: &str, index: u32) -> Chunk {
        Chunk::new(
            document.to_string(),
            "owner-1".to_string(),
            "collection-1".to_string(),
            index,
            "content".to_string(),
            vec![0.1, 0.2],
            3,
            None,
            None,
            Map::new(),
        )
    }

    #[test]
    fn candidate_in_both_lists_accumulates_both_contributions() {
        let shared = chunk("doc-1", 0);
        let vector_only = chunk("doc-2", 0);

        let vector_list = vec![
            ScoredChunk { chunk: shared.clone(), score: 0.9 },
            ScoredChunk { chunk: vector_only.clone(), score: 0.5 },
        ];
        let keyword_list = vec![ScoredChunk { chunk: shared.clone(), score: 4.2 }];

        let fused = reciprocal_rank_fusion(&[vector_list, keyword_list], 60.0);

        let shared_score = fused.iter().find(|f| f.chunk.id == shared.id).unwrap().score;
        let vector_only_score = fused
            .iter()
            .find(|f| f.chunk.id == vector_only.id)
            .unwrap()
            .score;

        let expected_shared = 1.0 / (60.0 + 1.0) + 1.0 / (60.0 + 1.0);
        assert!((shared_score - expected_shared).abs() < 1e-6);
        assert!(shared_score > vector_only_score);
    }

    #[test]
    fn ties_break_by_document_then_chunk_index() {
        let a = chunk("doc-a", 0);
        let b = chunk("doc-b", 0);
        let mut fused = vec![
            FusedChunk { chunk: b.clone(), score: 1.0 },
            FusedChunk { chunk: a.clone(), score: 1.0 },
        ];
        sort_by_score_desc(&mut fused);
        assert_eq!(fused[0].chunk.document, "doc-a");
    }
}
