use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;


stored_object!(Chunk, "chunk", {
    document: String,
    owner: String,
    collection: String,
    chunk_index: u32,
    content: String,
    embedding: Vec<f32>,
    token_count: u32,
    page: Option<u32>,
    section: Option<String>,
    metadata: HashMap<String, Value>,
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

impl Chunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        document: String,
        owner: String,
        collection: String,
        chunk_index: u32,
        content: String,
        embedding: Vec<f32>,
        token_count: u32,
        page: Option<u32>,
        section: Option<String>,
        metadata: HashMap<String, Value>,
    ) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document,
            owner,
            collection,
            chunk_index,
            content,
            embedding,
            token_count,
            page,
            section,
            metadata,
        }
    }

    /// Atomically replaces the chunk set for a document: deletes whatever a
    /// prior attempt left, then inserts the fresh set, per §4.1 stage 6.
    pub async fn replace_for_document(
        db: &SurrealDbClient,
        document_id: &str,
        chunks: Vec<Chunk>,
    ) -> Result<(), AppError> {
        db.query("DELETE chunk WHERE document = $document")
            .bind(("document", document_id.to_string()))
            .await?;
        for chunk in chunks {
            db.store_item(chunk).await?;
        }
        Ok(())
    }

    /// ANN search over the HNSW cosine index. `score = 1 - distance`.
    ///
    /// `filter` keys must already be whitelist-validated by the caller (§4.2
    /// `invalid_filter`) — they are interpolated into the query text as
    /// `metadata.<key>` field paths, since SurrealQL has no bind-parameter
    /// form for a dynamic field name. Values are always bound, never
    /// interpolated.
    pub async fn vector_search(
        db: &SurrealDbClient,
        owner: &str,
        collection: Option<&str>,
        embedding: &[f32],
        top_k: usize,
        filter: &HashMap<String, Value>,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let mut clauses = vec!["owner = $owner".to_string()];
        if collection.is_some() {
            clauses.push("collection = $collection".to_string());
        }
        clauses.push("embedding <|$take,100|> $embedding".to_string());
        push_filter_clauses(&mut clauses, filter);

        let query = format!(
            "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score FROM chunk \
             WHERE {} ORDER BY score DESC LIMIT $take",
            clauses.join(" AND ")
        );
        let mut q = db
            .query(query)
            .bind(("owner", owner.to_string()))
            .bind(("embedding", embedding.to_vec()))
            .bind(("take", top_k as i64));
        if let Some(collection) = collection {
            q = q.bind(("collection", collection.to_string()));
        }
        for (key, value) in filter {
            q = q.bind((format!("filter_{key}"), value.clone()));
        }
        let mut response = q.await?;
        let rows: Vec<ScoredRow> = response.take(0)?;
        Ok(rows.into_iter().map(ScoredRow::into_scored).collect())
    }

    /// BM25 full-text search against the `chunk.content` search index.
    pub async fn fts_search(
        db: &SurrealDbClient,
        owner: &str,
        collection: Option<&str>,
        query_text: &str,
        top_k: usize,
        filter: &HashMap<String, Value>,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let mut clauses = vec!["owner = $owner".to_string(), "content @0@ $query".to_string()];
        if collection.is_some() {
            clauses.push("collection = $collection".to_string());
        }
        push_filter_clauses(&mut clauses, filter);

        let query = format!(
            "SELECT *, search::score(0) AS score FROM chunk WHERE {} \
             ORDER BY score DESC LIMIT $take",
            clauses.join(" AND ")
        );
        let mut q = db
            .query(query)
            .bind(("owner", owner.to_string()))
            .bind(("query", query_text.to_string()))
            .bind(("take", top_k as i64));
        if let Some(collection) = collection {
            q = q.bind(("collection", collection.to_string()));
        }
        for (key, value) in filter {
            q = q.bind((format!("filter_{key}"), value.clone()));
        }
        let mut response = q.await?;
        let rows: Vec<ScoredRow> = response.take(0)?;
        Ok(rows.into_iter().map(ScoredRow::into_scored).collect())
    }

    pub async fn list_by_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM chunk WHERE document = $document ORDER BY chunk_index ASC")
            .bind(("document", document_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScoredRow {
    #[serde(flatten)]
    chunk: Chunk,
    score: f32,
}

impl ScoredRow {
    fn into_scored(self) -> ScoredChunk {
        ScoredChunk {
            chunk: self.chunk,
            score: self.score,
        }
    }
}

fn push_filter_clauses(clauses: &mut Vec<String>, filter: &HashMap<String, Value>) {
    for key in filter.keys() {
        clauses.push(format!("metadata.{key} = $filter_{key}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn fixture(document: &str, index: u32, content: &str, embedding: Vec<f32>) -> Chunk {
        Chunk::new(
            document.to_string(),
            "owner-1".to_string(),
            "collection-1".to_string(),
            index,
            content.to_string(),
            embedding,
            10,
            None,
            None,
            HashMap::new(),
        )
    }

    #[tokio::test]
    async fn vector_search_ranks_closer_embedding_first() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let a = fixture("doc-1", 0, "Kubernetes orchestration details", vec![0.9, 0.1, 0.0]);
        let b = fixture("doc-1", 1, "gardening tips for tomatoes", vec![0.0, 0.1, 0.9]);
        db.store_item(a.clone()).await.expect("store a");
        db.store_item(b.clone()).await.expect("store b");

        let results = Chunk::vector_search(&db, "owner-1", None, &[0.9, 0.1, 0.0], 2, &HashMap::new())
            .await
            .expect("search");
        assert_eq!(results.first().map(|r| r.chunk.id.clone()), Some(a.id));
    }

    #[tokio::test]
    async fn fts_search_matches_exact_phrase() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let a = fixture("doc-1", 0, "Kubernetes orchestration at scale", vec![0.1, 0.1, 0.1]);
        db.store_item(a.clone()).await.expect("store");

        let results = Chunk::fts_search(&db, "owner-1", None, "Kubernetes orchestration", 5, &HashMap::new())
            .await
            .expect("search");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, a.id);
    }

    #[tokio::test]
    async fn replace_for_document_is_atomic_swap() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(3).await.expect("init");

        let old = fixture("doc-1", 0, "old chunk", vec![0.1, 0.1, 0.1]);
        db.store_item(old).await.expect("store old");

        let fresh = vec![fixture("doc-1", 0, "new chunk", vec![0.2, 0.2, 0.2])];
        Chunk::replace_for_document(&db, "doc-1", fresh)
            .await
            .expect("replace");

        let remaining = Chunk::list_by_document(&db, "doc-1").await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content, "new chunk");
    }
}
