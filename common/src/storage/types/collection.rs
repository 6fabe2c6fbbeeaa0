use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;


#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    Semantic,
    Keyword,
    Hybrid,
    Hierarchical,
    Graph,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionConfig {
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub search_modes: Vec<SearchMode>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            chunk_size_tokens: 500,
            chunk_overlap_tokens: 50,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            search_modes: vec![
                SearchMode::Semantic,
                SearchMode::Keyword,
                SearchMode::Hybrid,
                SearchMode::Hierarchical,
            ],
        }
    }
}

stored_object!(Collection, "collection", {
    owner: String,
    name: String,
    description: Option<String>,
    metadata: HashMap<String, Value>,
    config: CollectionConfig,
});

impl Collection {
    pub fn new(
        owner: String,
        name: String,
        description: Option<String>,
        metadata: HashMap<String, Value>,
        config: CollectionConfig,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner,
            name,
            description,
            metadata,
            config,
        }
    }

    pub fn graph_enabled(&self) -> bool {
        self.config.search_modes.contains(&SearchMode::Graph)
    }

    pub async fn find_by_owner_and_name(
        db: &SurrealDbClient,
        owner: &str,
        name: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM collection WHERE owner = $owner AND name = $name LIMIT 1")
            .bind(("owner", owner.to_string()))
            .bind(("name", name.to_string()))
            .await?;
        let found: Vec<Self> = response.take(0)?;
        Ok(found.into_iter().next())
    }

    pub async fn list_by_owner(
        db: &SurrealDbClient,
        owner: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM collection WHERE owner = $owner ORDER BY created_at DESC LIMIT $limit START $offset")
            .bind(("owner", owner.to_string()))
            .bind(("limit", limit))
            .bind(("offset", offset))
            .await?;
        Ok(response.take(0)?)
    }

    /// Partial update for `PATCH /collections/{id}` (§6): only the fields
    /// supplied are touched.
    pub async fn patch(
        db: &SurrealDbClient,
        id: &str,
        name: Option<String>,
        description: Option<String>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Option<Self>, AppError> {
        let mut sets = vec!["updated_at = time::now()".to_string()];
        if name.is_some() {
            sets.push("name = $name".to_string());
        }
        if description.is_some() {
            sets.push("description = $description".to_string());
        }
        if metadata.is_some() {
            sets.push("metadata = $metadata".to_string());
        }

        let query = format!(
            "UPDATE type::thing('collection', $id) SET {} RETURN AFTER",
            sets.join(", ")
        );
        let mut q = db.query(query).bind(("id", id.to_string()));
        if let Some(name) = name {
            q = q.bind(("name", name));
        }
        if let Some(description) = description {
            q = q.bind(("description", description));
        }
        if let Some(metadata) = metadata {
            q = q.bind(("metadata", metadata));
        }
        let mut response = q.await?;
        let updated: Vec<Self> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    /// Cascades to documents, chunks, and the blob store (the latter is the
    /// caller's responsibility via `StorageManager`, since this type has no
    /// handle to the blob store).
    pub async fn delete_cascade(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "BEGIN TRANSACTION;
             DELETE chunk WHERE document IN (SELECT VALUE id FROM document WHERE collection = $id);
             DELETE knowledge_relationship WHERE collection = $id;
             DELETE knowledge_entity WHERE collection = $id;
             DELETE document WHERE collection = $id;
             DELETE type::thing('collection', $id);
             COMMIT TRANSACTION;",
        )
        .bind(("id", id.to_string()))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn delete_cascade_removes_documents_and_chunks() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let collection = Collection::new(
            "owner-1".into(),
            "docs".into(),
            None,
            HashMap::new(),
            CollectionConfig::default(),
        );
        db.store_item(collection.clone()).await.expect("store");

        Collection::delete_cascade(&db, &collection.id)
            .await
            .expect("cascade");

        let remaining = db
            .get_item::<Collection>(&collection.id)
            .await
            .expect("get");
        assert!(remaining.is_none());
    }

    #[tokio::test]
    async fn patch_only_touches_supplied_fields() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let collection = Collection::new(
            "owner-1".into(),
            "docs".into(),
            Some("original".into()),
            HashMap::new(),
            CollectionConfig::default(),
        );
        db.store_item(collection.clone()).await.expect("store");

        let patched = Collection::patch(&db, &collection.id, Some("renamed".into()), None, None)
            .await
            .expect("patch")
            .expect("row");
        assert_eq!(patched.name, "renamed");
        assert_eq!(patched.description, Some("original".to_string()));
    }
}
