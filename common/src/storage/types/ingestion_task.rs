use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::storage::db::SurrealDbClient;
use crate::stored_object;

use super::ingestion_payload::IngestionPayload;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskErrorInfo {
    pub code: String,
    pub message: String,
}

/// An append-only row per ingestion attempt (§3 Job record). A document may
/// have many `IngestionTask` rows across retries; the document's own
/// `status` field, not this table, is the CAS-guarded source of truth for
/// "what state is this document in right now".
stored_object!(IngestionTask, "job", {
    payload: IngestionPayload,
    status: JobStatus,
    attempt: u32,
    worker_id: Option<String>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    finished_at: Option<chrono::DateTime<chrono::Utc>>,
    last_error: Option<TaskErrorInfo>,
});

pub const MAX_ATTEMPTS: u32 = 3;

impl IngestionTask {
    pub fn new(payload: IngestionPayload) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            payload,
            status: JobStatus::Queued,
            attempt: 1,
            worker_id: None,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    pub async fn enqueue(db: &SurrealDbClient, payload: IngestionPayload) -> Result<Self, AppError> {
        let task = Self::new(payload);
        db.store_item(task.clone()).await?;
        Ok(task)
    }

    /// Re-enqueues a fresh attempt for the same document after a `failed`
    /// terminal state, carrying the attempt counter forward per §8's
    /// "re-submitting while failed starts a new attempt" property.
    pub async fn enqueue_retry(
        db: &SurrealDbClient,
        payload: IngestionPayload,
        previous_attempt: u32,
    ) -> Result<Self, AppError> {
        let mut task = Self::new(payload);
        task.attempt = previous_attempt + 1;
        db.store_item(task.clone()).await?;
        Ok(task)
    }

    /// Claims the oldest queued job for exclusive processing by CAS on
    /// `status`. A `None` result means another worker won the race or the
    /// queue is empty; the caller backs off and polls again.
    pub async fn claim_next_ready(
        db: &SurrealDbClient,
        worker_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM job WHERE status = 'queued' ORDER BY created_at ASC LIMIT 1")
            .await?;
        let candidates: Vec<Self> = response.take(0)?;
        let Some(candidate) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let mut response = db
            .query(
                "UPDATE type::thing('job', $id) SET status = 'running', worker_id = $worker_id, \
                 started_at = time::now(), updated_at = time::now() WHERE status = 'queued' RETURN AFTER",
            )
            .bind(("id", candidate.id.clone()))
            .bind(("worker_id", worker_id.to_string()))
            .await?;
        let claimed: Vec<Self> = response.take(0)?;
        Ok(claimed.into_iter().next())
    }

    pub async fn mark_succeeded(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('job', $id) SET status = 'succeeded', finished_at = time::now(), updated_at = time::now()",
        )
        .bind(("id", id.to_string()))
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        db: &SurrealDbClient,
        id: &str,
        error: TaskErrorInfo,
    ) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('job', $id) SET status = 'failed', finished_at = time::now(), \
             updated_at = time::now(), last_error = $error",
        )
        .bind(("id", id.to_string()))
        .bind(("error", error))
        .await?;
        Ok(())
    }

    /// The in-flight attempt for a document, if any. §4.1's `cancel` only
    /// ever targets a `running` attempt — a `queued` one hasn't started
    /// doing anything cancellable yet, and anything else has already
    /// finished.
    pub async fn find_running_for_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let mut response = db
            .query(
                "SELECT * FROM job WHERE payload.document_id = $document_id AND status = 'running' \
                 ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("document_id", document_id.to_string()))
            .await?;
        let candidates: Vec<Self> = response.take(0)?;
        Ok(candidates.into_iter().next())
    }

    pub async fn mark_cancelled(db: &SurrealDbClient, id: &str) -> Result<(), AppError> {
        db.query(
            "UPDATE type::thing('job', $id) SET status = 'cancelled', finished_at = time::now(), updated_at = time::now()",
        )
        .bind(("id", id.to_string()))
        .await?;
        Ok(())
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < MAX_ATTEMPTS
    }

    pub async fn history_for_document(
        db: &SurrealDbClient,
        document_id: &str,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .query("SELECT * FROM job WHERE payload.document_id = $document_id ORDER BY created_at ASC")
            .bind(("document_id", document_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn payload() -> IngestionPayload {
        IngestionPayload {
            document_id: "doc-1".into(),
            owner: "owner-1".into(),
            collection_id: "collection-1".into(),
            blob_key: "blob-1".into(),
            mime_type: "text/plain".into(),
        }
    }

    #[tokio::test]
    async fn claim_is_exclusive_across_concurrent_workers() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        IngestionTask::enqueue(&db, payload()).await.expect("enqueue");

        let first = IngestionTask::claim_next_ready(&db, "worker-a")
            .await
            .expect("claim")
            .expect("should claim");
        let second = IngestionTask::claim_next_ready(&db, "worker-b")
            .await
            .expect("claim");
        assert!(second.is_none());
        assert_eq!(first.worker_id, Some("worker-a".to_string()));
    }

    #[tokio::test]
    async fn retry_carries_attempt_counter_forward() {
        let db = SurrealDbClient::memory("test", &Uuid::new_v4().to_string())
            .await
            .expect("db");
        db.ensure_initialized(4).await.expect("init");

        let first = IngestionTask::enqueue(&db, payload()).await.expect("enqueue");
        let retry = IngestionTask::enqueue_retry(&db, payload(), first.attempt)
            .await
            .expect("retry");
        assert_eq!(retry.attempt, 2);
        assert!(retry.can_retry());
    }
}
