use std::ops::Deref;

use futures::Stream;
use surrealdb::engine::any::{connect, Any};
use surrealdb::opt::auth::Root;
use surrealdb::{Error, Notification, Surreal};

use super::types::StoredObject;
use crate::error::AppError;

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;
        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }

    /// Schema and index setup, run once at startup. Idempotent: `DEFINE ...
    /// IF NOT EXISTS` so a restarting process never fails on an existing
    /// schema.
    pub async fn ensure_initialized(&self, embedding_dimension: usize) -> Result<(), AppError> {
        self.client
            .query(
                "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_user_email ON TABLE user FIELDS email UNIQUE;
                 DEFINE TABLE IF NOT EXISTS api_key SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_api_key_hash ON TABLE api_key FIELDS key_hash UNIQUE;
                 DEFINE TABLE IF NOT EXISTS collection SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_collection_owner_name ON TABLE collection FIELDS owner, name UNIQUE;
                 DEFINE TABLE IF NOT EXISTS document SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_document_owner_hash ON TABLE document FIELDS owner, content_hash UNIQUE;
                 DEFINE INDEX IF NOT EXISTS idx_document_collection ON TABLE document FIELDS collection;
                 DEFINE TABLE IF NOT EXISTS chunk SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_chunk_document_index ON TABLE chunk FIELDS document, chunk_index UNIQUE;
                 DEFINE ANALYZER IF NOT EXISTS chunk_analyzer TOKENIZERS class FILTERS lowercase, ascii, snowball(english);
                 DEFINE INDEX IF NOT EXISTS idx_chunk_content_fts ON TABLE chunk FIELDS content SEARCH ANALYZER chunk_analyzer BM25 HIGHLIGHTS;
                 DEFINE TABLE IF NOT EXISTS chat_session SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_session_owner ON TABLE chat_session FIELDS owner;
                 DEFINE TABLE IF NOT EXISTS chat_message SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_message_session_position ON TABLE chat_message FIELDS session, position UNIQUE;
                 DEFINE TABLE IF NOT EXISTS job SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_job_document ON TABLE job FIELDS document;
                 DEFINE INDEX IF NOT EXISTS idx_job_status ON TABLE job FIELDS status;
                 DEFINE TABLE IF NOT EXISTS knowledge_entity SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_entity_document ON TABLE knowledge_entity FIELDS document;
                 DEFINE INDEX IF NOT EXISTS idx_entity_owner_collection ON TABLE knowledge_entity FIELDS owner, collection;
                 DEFINE TABLE IF NOT EXISTS knowledge_relationship SCHEMALESS;
                 DEFINE INDEX IF NOT EXISTS idx_relationship_document ON TABLE knowledge_relationship FIELDS document;
                 DEFINE INDEX IF NOT EXISTS idx_relationship_source ON TABLE knowledge_relationship FIELDS owner, source_entity;
                 DEFINE INDEX IF NOT EXISTS idx_relationship_target ON TABLE knowledge_relationship FIELDS owner, target_entity;",
            )
            .await?;
        self.build_indexes(embedding_dimension).await?;
        Ok(())
    }

    /// Vector index dimension is collection-configurable in principle, but
    /// SurrealDB's HNSW index is defined per-table; this core uses one
    /// global chunk/entity table indexed at the deployment-wide embedding
    /// dimension (§12 config), matching the teacher's single-model setup.
    pub async fn build_indexes(&self, embedding_dimension: usize) -> Result<(), Error> {
        self.client
            .query(format!(
                "DEFINE INDEX IF NOT EXISTS idx_chunk_embedding ON TABLE chunk FIELDS embedding HNSW DIMENSION {embedding_dimension} DIST COSINE;
                 DEFINE INDEX IF NOT EXISTS idx_entity_embedding ON TABLE knowledge_entity FIELDS embedding HNSW DIMENSION {embedding_dimension} DIST COSINE;"
            ))
            .await?;
        Ok(())
    }

    pub async fn rebuild_indexes(&self) -> Result<(), Error> {
        self.client
            .query(
                "REBUILD INDEX IF EXISTS idx_chunk_embedding ON chunk;
                 REBUILD INDEX IF EXISTS idx_entity_embedding ON knowledge_entity;",
            )
            .await?;
        Ok(())
    }

    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }

    pub async fn listen<T>(
        &self,
    ) -> Result<impl Stream<Item = Result<Notification<T>, Error>>, Error>
    where
        T: for<'de> StoredObject + std::marker::Unpin,
    {
        self.client.select(T::table_name()).live().await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// In-memory SurrealDB instance for tests; never used outside `cfg(test)`
    /// or the `test-utils` feature.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;
        db.use_ns(namespace).use_db(database).await?;
        Ok(SurrealDbClient { client: db })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stored_object;
    use chrono::Utc;
    use uuid::Uuid;

    stored_object!(Dummy, "dummy", {
        name: String
    });

    #[tokio::test]
    async fn initializes_schema_and_round_trips_an_item() {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory db");
        db.ensure_initialized(8).await.expect("schema init");

        let dummy = Dummy {
            id: "abc".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            name: "first".to_string(),
        };
        db.store_item(dummy.clone()).await.expect("store");
        let fetched = db.get_item::<Dummy>(&dummy.id).await.expect("get");
        assert_eq!(fetched, Some(dummy.clone()));

        let deleted = db.delete_item::<Dummy>(&dummy.id).await.expect("delete");
        assert_eq!(deleted, Some(dummy));
        assert!(db
            .get_item::<Dummy>("abc")
            .await
            .expect("get after delete")
            .is_none());
    }
}
