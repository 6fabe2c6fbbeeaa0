use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;

/// A directed edge between two `KnowledgeEntity` rows. Modelled as a plain
/// table rather than a SurrealDB `RELATE` edge table, since graph mode here
/// only needs one-hop neighbourhood expansion, not general graph traversal.
stored_object!(KnowledgeRelationship, "knowledge_relationship", {
    owner: String,
    collection: String,
    document: String,
    source_entity: String,
    target_entity: String,
    relationship_type: String,
});

impl KnowledgeRelationship {
    pub fn new(
        owner: String,
        collection: String,
        document: String,
        source_entity: String,
        target_entity: String,
        relationship_type: String,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner,
            collection,
            document,
            source_entity,
            target_entity,
            relationship_type,
        }
    }

    pub async fn replace_for_document(
        db: &SurrealDbClient,
        document_id: &str,
        relationships: Vec<KnowledgeRelationship>,
    ) -> Result<(), AppError> {
        db.query("DELETE knowledge_relationship WHERE document = $document")
            .bind(("document", document_id.to_string()))
            .await?;
        for relationship in relationships {
            db.store_item(relationship).await?;
        }
        Ok(())
    }

    /// One-hop neighbour entity ids reachable from any of `entity_ids`, in
    /// either edge direction.
    pub async fn neighbours(
        db: &SurrealDbClient,
        owner: &str,
        entity_ids: &[String],
    ) -> Result<Vec<String>, AppError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut response = db
            .query(
                "SELECT VALUE target_entity FROM knowledge_relationship \
                 WHERE owner = $owner AND source_entity IN $ids \
                 UNION SELECT VALUE source_entity FROM knowledge_relationship \
                 WHERE owner = $owner AND target_entity IN $ids",
            )
            .bind(("owner", owner.to_string()))
            .bind(("ids", entity_ids.to_vec()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;
    use uuid::Uuid;

    #[tokio::test]
    async fn neighbours_reaches_both_edge_directions() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let forward = KnowledgeRelationship::new(
            "owner-1".into(),
            "collection-1".into(),
            "doc-1".into(),
            "entity-a".into(),
            "entity-b".into(),
            "relates_to".into(),
        );
        let backward = KnowledgeRelationship::new(
            "owner-1".into(),
            "collection-1".into(),
            "doc-1".into(),
            "entity-c".into(),
            "entity-a".into(),
            "relates_to".into(),
        );
        db.store_item(forward).await.expect("store forward");
        db.store_item(backward).await.expect("store backward");

        let mut neighbours = KnowledgeRelationship::neighbours(
            &db,
            "owner-1",
            &["entity-a".to_string()],
        )
        .await
        .expect("neighbours");
        neighbours.sort();
        assert_eq!(neighbours, vec!["entity-b".to_string(), "entity-c".to_string()]);
    }
}
