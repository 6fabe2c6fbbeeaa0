use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;


/// §4.1 document state machine. CAS-guarded transitions only; no variant
/// is ever written by a last-writer-wins update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProcessingInfo {
    pub parser: Option<String>,
    pub embedding_model: Option<String>,
    pub parse_ms: Option<u64>,
    pub embed_ms: Option<u64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

stored_object!(Document, "document", {
    owner: String,
    collection: String,
    title: String,
    filename: String,
    mime_type: String,
    byte_size: u64,
    content_hash: String,
    source_id_hash: Option<String>,
    blob_key: String,
    status: DocumentStatus,
    metadata: HashMap<String, Value>,
    processing_info: ProcessingInfo,
    chunk_count: u32,
    total_tokens: u64,
    processed_at: Option<chrono::DateTime<chrono::Utc>>,
});

impl Document {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        owner: String,
        collection: String,
        title: String,
        filename: String,
        mime_type: String,
        byte_size: u64,
        content_hash: String,
        source_id_hash: Option<String>,
        blob_key: String,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            owner,
            collection,
            title,
            filename,
            mime_type,
            byte_size,
            content_hash,
            source_id_hash,
            blob_key,
            status: DocumentStatus::Pending,
            metadata,
            processing_info: ProcessingInfo::default(),
            chunk_count: 0,
            total_tokens: 0,
            processed_at: None,
        }
    }

    pub async fn find_by_owner_and_hash(
        db: &SurrealDbClient,
        owner: &str,
        content_hash: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM document WHERE owner = $owner AND content_hash = $hash AND status = 'completed' LIMIT 1")
            .bind(("owner", owner.to_string()))
            .bind(("hash", content_hash.to_string()))
            .await?;
        let docs: Vec<Self> = response.take(0)?;
        Ok(docs.into_iter().next())
    }

    /// Conditional state transition: succeeds only if the row's current
    /// `status` equals `expected`. Returns `Ok(None)` if another worker
    /// already claimed/advanced it — the caller must treat that as "lost
    /// the race", not an error.
    pub async fn transition(
        db: &SurrealDbClient,
        id: &str,
        expected: DocumentStatus,
        next: DocumentStatus,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "UPDATE type::thing('document', $id) SET status = $next, updated_at = time::now() \
                 WHERE status = $expected RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .bind(("expected", expected.to_string()))
            .bind(("next", next.to_string()))
            .await?;
        let updated: Vec<Self> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    pub async fn mark_failed(
        db: &SurrealDbClient,
        id: &str,
        error_code: &str,
        error_message: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "UPDATE type::thing('document', $id) SET \
                 status = 'failed', updated_at = time::now(), \
                 processing_info.error_code = $code, processing_info.error_message = $message \
                 RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .bind(("code", error_code.to_string()))
            .bind(("message", error_message.to_string()))
            .await?;
        let updated: Vec<Self> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    pub async fn mark_completed(
        db: &SurrealDbClient,
        id: &str,
        chunk_count: u32,
        total_tokens: u64,
        processing_info: ProcessingInfo,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "UPDATE type::thing('document', $id) SET \
                 status = 'completed', updated_at = time::now(), processed_at = time::now(), \
                 chunk_count = $chunk_count, total_tokens = $total_tokens, processing_info = $info \
                 WHERE status = 'running' RETURN AFTER",
            )
            .bind(("id", id.to_string()))
            .bind(("chunk_count", chunk_count))
            .bind(("total_tokens", total_tokens))
            .bind(("info", processing_info))
            .await?;
        let updated: Vec<Self> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    /// Partial update for `PATCH /documents/{id}` (§6). Content and the
    /// pipeline-managed fields (`status`, `chunk_count`, ...) are not
    /// editable through this path.
    pub async fn patch(
        db: &SurrealDbClient,
        id: &str,
        title: Option<String>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<Option<Self>, AppError> {
        let mut sets = vec!["updated_at = time::now()".to_string()];
        if title.is_some() {
            sets.push("title = $title".to_string());
        }
        if metadata.is_some() {
            sets.push("metadata = $metadata".to_string());
        }

        let query = format!(
            "UPDATE type::thing('document', $id) SET {} RETURN AFTER",
            sets.join(", ")
        );
        let mut q = db.query(query).bind(("id", id.to_string()));
        if let Some(title) = title {
            q = q.bind(("title", title));
        }
        if let Some(metadata) = metadata {
            q = q.bind(("metadata", metadata));
        }
        let mut response = q.await?;
        let updated: Vec<Self> = response.take(0)?;
        Ok(updated.into_iter().next())
    }

    /// Removes a single document and everything scoped to it: its chunks
    /// and any knowledge-graph rows extracted from it. The blob itself is
    /// the caller's responsibility via `StorageManager`, same convention as
    /// `Collection::delete_cascade`.
    pub async fn delete_with_children(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "BEGIN TRANSACTION;
             DELETE knowledge_relationship WHERE document = $id;
             DELETE knowledge_entity WHERE document = $id;
             DELETE chunk WHERE document = $id;
             DELETE type::thing('document', $id);
             COMMIT TRANSACTION;",
        )
        .bind(("id", id.to_string()))
        .await?;
        Ok(())
    }

    pub async fn list_by_collection(
        db: &SurrealDbClient,
        owner: &str,
        collection: &str,
        status: Option<DocumentStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Self>, AppError> {
        let query = if status.is_some() {
            "SELECT * FROM document WHERE owner = $owner AND collection = $collection AND status = $status \
             ORDER BY created_at DESC LIMIT $limit START $offset"
        } else {
            "SELECT * FROM document WHERE owner = $owner AND collection = $collection \
             ORDER BY created_at DESC LIMIT $limit START $offset"
        };
        let mut q = db
            .query(query)
            .bind(("owner", owner.to_string()))
            .bind(("collection", collection.to_string()))
            .bind(("limit", limit))
            .bind(("offset", offset));
        if let Some(status) = status {
            q = q.bind(("status", status.to_string()));
        }
        let mut response = q.await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::SurrealDbClient;
    use uuid::Uuid;

    fn fixture() -> Document {
        Document::new(
            "owner-1".into(),
            "collection-1".into(),
            "doc".into(),
            "doc.txt".into(),
            "text/plain".into(),
            10,
            "hash-1".into(),
            None,
            "blob-1".into(),
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn transition_fails_when_expected_state_does_not_match() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(8).await.expect("init");
        let doc = fixture();
        db.store_item(doc.clone()).await.expect("store");

        let result = Document::transition(
            &db,
            &doc.id,
            DocumentStatus::Running,
            DocumentStatus::Completed,
        )
        .await
        .expect("query ok");
        assert!(result.is_none());

        let result = Document::transition(
            &db,
            &doc.id,
            DocumentStatus::Pending,
            DocumentStatus::Queued,
        )
        .await
        .expect("query ok");
        assert_eq!(result.map(|d| d.status), Some(DocumentStatus::Queued));
    }

    #[tokio::test]
    async fn owner_content_hash_lookup_only_matches_completed() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(8).await.expect("init");
        let mut doc = fixture();
        doc.status = DocumentStatus::Completed;
        db.store_item(doc.clone()).await.expect("store");

        let found = Document::find_by_owner_and_hash(&db, "owner-1", "hash-1")
            .await
            .expect("query");
        assert_eq!(found.map(|d| d.id), Some(doc.id));
    }

    #[tokio::test]
    async fn delete_with_children_removes_chunks() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(8).await.expect("init");

        let doc = fixture();
        db.store_item(doc.clone()).await.expect("store");
        let chunk = crate::storage::types::chunk::Chunk::new(
            doc.id.clone(),
            "owner-1".into(),
            "collection-1".into(),
            0,
            "content".into(),
            vec![0.1, 0.1, 0.1],
            5,
            None,
            None,
            HashMap::new(),
        );
        db.store_item(chunk).await.expect("store chunk");

        Document::delete_with_children(&db, &doc.id).await.expect("delete");

        assert!(db.get_item::<Document>(&doc.id).await.expect("get").is_none());
        let remaining = crate::storage::types::chunk::Chunk::list_by_document(&db, &doc.id)
            .await
            .expect("list");
        assert!(remaining.is_empty());
    }
}
