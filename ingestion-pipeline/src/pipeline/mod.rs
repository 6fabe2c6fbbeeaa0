pub mod config;
pub mod context;
pub mod extraction;
pub mod stages;
pub mod state;

use std::sync::Arc;

use common::error::AppError;
use common::storage::db::SurrealDbClient;
use common::storage::types::document::{Document, DocumentStatus};
use common::storage::types::ingestion_task::{IngestionTask, TaskErrorInfo};
use tracing::instrument;

use config::IngestionTuning;
use context::{PipelineContext, PipelineServices};
use state::fetched;

/// Drives one job's attempt through fetch→parse→dedupe→chunk→embed→persist
/// (§4.1), translating stage failures into the document's CAS-guarded state
/// transitions and, where attempts remain, a fresh retry enqueue.
pub struct IngestionPipeline {
    services: Arc<PipelineServices>,
    tuning: IngestionTuning,
}

/// §4.1's `cancel(document_id)`: best-effort, and only meaningful against
/// an attempt that's actually `running`. This flips the job and document
/// rows to `cancelled`; it does not reach into the worker actively
/// processing the job and interrupt it mid-stage. That worker's own
/// CAS-guarded writes (`Document::mark_completed`/`mark_failed`, both
/// gated on `status = 'running'`) simply stop matching once this call
/// lands, so whatever result it eventually computes is discarded rather
/// than overwriting the cancellation. Chunks already written by a prior
/// *successful* attempt are untouched. Returns `false` if there was
/// nothing running to cancel.
pub async fn cancel_document(db: &SurrealDbClient, document_id: &str) -> Result<bool, AppError> {
    let Some(job) = IngestionTask::find_running_for_document(db, document_id).await? else {
        return Ok(false);
    };

    IngestionTask::mark_cancelled(db, &job.id).await?;
    Document::transition(db, document_id, DocumentStatus::Running, DocumentStatus::Cancelled).await?;
    Ok(true)
}

impl IngestionPipeline {
    pub fn new(services: Arc<PipelineServices>, tuning: IngestionTuning) -> Self {
        Self { services, tuning }
    }

    #[instrument(skip_all, fields(job_id = %task.id, document_id = %task.payload.document_id, attempt = task.attempt))]
    pub async fn process_task(&self, task: &IngestionTask) -> Result<(), AppError> {
        let db = self.services.db.clone();

        let transitioned = Document::transition(
            &db,
            &task.payload.document_id,
            DocumentStatus::Queued,
            DocumentStatus::Running,
        )
        .await?;
        if transitioned.is_none() {
            let message = "document was not in the queued state at claim time".to_string();
            let info = TaskErrorInfo {
                code: "internal_error".to_string(),
                message: message.clone(),
            };
            IngestionTask::mark_failed(&db, &task.id, info).await?;
            Document::mark_failed(&db, &task.payload.document_id, "internal_error", &message).await?;
            return Err(AppError::InternalError(message));
        }

        let mut ctx = PipelineContext::new(
            task.id.clone(),
            task.attempt,
            task.payload.clone(),
            self.tuning.clone(),
            self.services.clone(),
        );

        match self.run_stages(&mut ctx).await {
            Ok(()) => {
                IngestionTask::mark_succeeded(&db, &task.id).await?;
                Ok(())
            }
            Err(err) => {
                let err = ctx.abort(err);
                self.handle_failure(&db, task, err).await
            }
        }
    }

    async fn run_stages(&self, ctx: &mut PipelineContext) -> Result<(), AppError> {
        let machine = fetched();
        let bytes = stages::fetch::run(ctx).await?;
        let machine = stages::parse::run(machine, ctx, bytes).await?;
        let machine = stages::dedupe::run(machine, ctx).await?;
        let machine = stages::enrich::run(machine, ctx).await?;
        let machine = stages::chunk::run(machine, ctx).await?;
        let machine = stages::embed::run(machine, ctx).await?;
        let _machine = stages::persist::run(machine, ctx).await?;
        Ok(())
    }

    /// §4.1 failure semantics: duplicates and attempts-exhausted errors are
    /// terminal; other retryable errors get a fresh job after the
    /// configured backoff, with the document reverted to `queued` so the
    /// next claim can pick it up.
    async fn handle_failure(
        &self,
        db: &SurrealDbClient,
        task: &IngestionTask,
        err: AppError,
    ) -> Result<(), AppError> {
        let info = TaskErrorInfo {
            code: err.code().to_string(),
            message: err.to_string(),
        };
        IngestionTask::mark_failed(db, &task.id, info).await?;

        if matches!(err, AppError::Duplicate { .. }) {
            Document::mark_failed(db, &task.payload.document_id, err.code(), &err.to_string())
                .await?;
            return Err(err);
        }

        if err.is_retryable() && task.can_retry() {
            tokio::time::sleep(self.tuning.retry_delay(task.attempt)).await;
            Document::transition(
                db,
                &task.payload.document_id,
                DocumentStatus::Running,
                DocumentStatus::Queued,
            )
            .await?;
            IngestionTask::enqueue_retry(db, task.payload.clone(), task.attempt).await?;
        } else {
            Document::mark_failed(db, &task.payload.document_id, err.code(), &err.to_string())
                .await?;
        }
        Err(err)
    }
}
