use std::collections::HashMap;

use common::error::AppError;
use common::storage::types::chunk::{Chunk, ScoredChunk};
use common::storage::types::knowledge_entity::KnowledgeEntity;
use common::storage::types::knowledge_relationship::KnowledgeRelationship;

use super::{graph_enabled, semantic, ModeInput};

/// §4.2 graph mode: resolve the entities the query mentions, expand one
/// hop via `relationship`, then return chunks from the documents those
/// entities belong to — seed entities score at their similarity, neighbour
/// entities decay by `score_decay` per hop. Falls back to semantic search
/// when the collection hasn't opted into graph mode, or has no collection
/// scope to check (graph mode is collection-scoped only).
pub async fn search(
    input: &ModeInput<'_>,
    seed_limit: usize,
    neighbor_limit: usize,
    score_decay: f32,
) -> Result<Vec<ScoredChunk>, AppError> {
    let Some(collection) = input.collection else {
        return semantic::search(input).await;
    };
    if !graph_enabled(input.db, input.owner, collection).await? {
        return semantic::search(input).await;
    }
    let embedding = input.embedding.ok_or_else(|| {
        AppError::Validation("graph search requires a query embedding".into())
    })?;

    let seeds =
        KnowledgeEntity::nearest_to_query(input.db, input.owner, collection, embedding, seed_limit)
            .await?;
    if seeds.is_empty() {
        return Ok(Vec::new());
    }

    let seed_ids: Vec<String> = seeds.iter().map(|s| s.entity.id.clone()).collect();
    let mut neighbor_ids = KnowledgeRelationship::neighbours(input.db, input.owner, &seed_ids).await?;
    neighbor_ids.truncate(neighbor_limit);

    let mut entity_scores: HashMap<String, f32> = HashMap::new();
    for seed in &seeds {
        entity_scores.insert(seed.entity.document.clone(), seed.score);
    }

    for id in &neighbor_ids {
        if let Some(entity) = input.db.get_item::<KnowledgeEntity>(id).await? {
            if entity.owner != input.owner {
                continue;
            }
            let decayed = seeds
                .iter()
                .map(|s| s.score * score_decay)
                .fold(0.0_f32, f32::max);
            entity_scores
                .entry(entity.document)
                .and_modify(|existing| *existing = existing.max(decayed))
                .or_insert(decayed);
        }
    }

    let mut scored_chunks: HashMap<String, ScoredChunk> = HashMap::new();
    for (document_id, score) in entity_scores {
        for chunk in Chunk::list_by_document(input.db, &document_id).await? {
            scored_chunks
                .entry(chunk.id.clone())
                .and_modify(|existing| existing.score = existing.score.max(score))
                .or_insert(ScoredChunk { chunk, score });
        }
    }

    let mut results: Vec<ScoredChunk> = scored_chunks.into_values().collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(input.top_k);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use common::storage::db::SurrealDbClient;
    use common::storage::types::collection::{Collection, CollectionConfig};
    use uuid::Uuid;

    use super::*;
    use crate::modes::ModeInput;

    async fn db_with_collection(graph_enabled: bool) -> (SurrealDbClient, Collection) {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let mut config = CollectionConfig::default();
        if graph_enabled {
            config.search_modes.push(common::storage::types::collection::SearchMode::Graph);
        }
        let collection = Collection::new(
            "owner-1".to_string(),
            "docs".to_string(),
            None,
            HashMap::new(),
            config,
        );
        db.store_item(collection.clone()).await.expect("store collection");
        (db, collection)
    }

    #[tokio::test]
    async fn falls_back_to_semantic_when_collection_has_no_graph_opt_in() {
        let (db, collection) = db_with_collection(false).await;

        let chunk = Chunk::new(
            "doc-1".to_string(),
            "owner-1".to_string(),
            collection.id.clone(),
            0,
            "content".to_string(),
            vec![0.9, 0.1, 0.0],
            5,
            None,
            None,
            HashMap::new(),
        );
        db.store_item(chunk.clone()).await.expect("store chunk");

        let embedding = vec![0.9, 0.1, 0.0];
        let input = ModeInput {
            db: &db,
            owner: "owner-1",
            collection: Some(collection.id.as_str()),
            query: "hello",
            embedding: Some(embedding.as_slice()),
            top_k: 5,
            metadata_filter: &HashMap::new(),
        };

        let results = search(&input, 5, 6, 0.75).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, chunk.id);
    }

    #[tokio::test]
    async fn falls_back_to_semantic_without_a_collection_scope() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let chunk = Chunk::new(
            "doc-1".to_string(),
            "owner-1".to_string(),
            "collection-1".to_string(),
            0,
            "content".to_string(),
            vec![0.9, 0.1, 0.0],
            5,
            None,
            None,
            HashMap::new(),
        );
        db.store_item(chunk.clone()).await.expect("store chunk");

        let embedding = vec![0.9, 0.1, 0.0];
        let input = ModeInput {
            db: &db,
            owner: "owner-1",
            collection: None,
            query: "hello",
            embedding: Some(embedding.as_slice()),
            top_k: 5,
            metadata_filter: &HashMap::new(),
        };

        let results = search(&input, 5, 6, 0.75).await.expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, chunk.id);
    }
}
