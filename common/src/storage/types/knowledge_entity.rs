use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;

stored_object!(KnowledgeEntity, "knowledge_entity", {
    owner: String,
    collection: String,
    document: String,
    name: String,
    entity_type: String,
    description: String,
    embedding: Vec<f32>,
    metadata: HashMap<String, Value>,
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredEntity {
    pub entity: KnowledgeEntity,
    pub score: f32,
}

impl KnowledgeEntity {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: String,
        collection: String,
        document: String,
        name: String,
        entity_type: String,
        description: String,
        embedding: Vec<f32>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner,
            collection,
            document,
            name,
            entity_type,
            description,
            embedding,
            metadata,
        }
    }

    /// Resolves the entities a free-text query "mentions" by nearest
    /// embedding neighbours, scoped to the owner's collection (§4.2 graph
    /// mode: "entity/relationship index built from chunks... reached via
    /// entity neighbourhood expansion from the query's mentioned
    /// entities").
    pub async fn nearest_to_query(
        db: &SurrealDbClient,
        owner: &str,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredEntity>, AppError> {
        let mut response = db
            .query(
                "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score \
                 FROM knowledge_entity WHERE owner = $owner AND collection = $collection \
                 AND embedding <|$take,100|> $embedding ORDER BY score DESC LIMIT $take",
            )
            .bind(("owner", owner.to_string()))
            .bind(("collection", collection.to_string()))
            .bind(("embedding", embedding.to_vec()))
            .bind(("take", top_k as i64))
            .await?;
        let rows: Vec<ScoredRow> = response.take(0)?;
        Ok(rows.into_iter().map(ScoredRow::into_scored).collect())
    }

    pub async fn list_by_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM knowledge_entity WHERE document = $document")
            .bind(("document", document_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn replace_for_document(
        db: &SurrealDbClient,
        document_id: &str,
        entities: Vec<KnowledgeEntity>,
    ) -> Result<(), AppError> {
        db.query("DELETE knowledge_entity WHERE document = $document")
            .bind(("document", document_id.to_string()))
            .await?;
        for entity in entities {
            db.store_item(entity).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoredRow {
    #[serde(flatten)]
    entity: KnowledgeEntity,
    score: f32,
}

impl ScoredRow {
    fn into_scored(self) -> ScoredEntity {
        ScoredEntity {
            entity: self.entity,
            score: self.score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;
    use uuid::Uuid;

    fn fixture(name: &str, embedding: Vec<f32>) -> KnowledgeEntity {
        KnowledgeEntity::new(
            "owner-1".into(),
            "collection-1".into(),
            "doc-1".into(),
            name.to_string(),
            "concept".into(),
            "a description".into(),
            embedding,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn nearest_to_query_ranks_closer_entity_first() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let a = fixture("Kubernetes", vec![0.9, 0.1, 0.0]);
        let b = fixture("Tomato plants", vec![0.0, 0.1, 0.9]);
        db.store_item(a.clone()).await.expect("store a");
        db.store_item(b.clone()).await.expect("store b");

        let results = KnowledgeEntity::nearest_to_query(
            &db,
            "owner-1",
            "collection-1",
            &[0.9, 0.1, 0.0],
            2,
        )
        .await
        .expect("search");
        assert_eq!(results.first().map(|r| r.entity.id.clone()), Some(a.id));
    }

    #[tokio::test]
    async fn replace_for_document_is_atomic_swap() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let old = fixture("old", vec![0.1, 0.1, 0.1]);
        db.store_item(old).await.expect("store old");

        let fresh = vec![fixture("new", vec![0.2, 0.2, 0.2])];
        KnowledgeEntity::replace_for_document(&db, "doc-1", fresh)
            .await
            .expect("replace");

        let remaining = KnowledgeEntity::list_by_document(&db, "doc-1")
            .await
            .expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "new");
    }
}
