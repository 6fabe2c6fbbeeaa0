pub mod parsers;
pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use common::storage::types::ingestion_task::IngestionTask;
use tracing::{info, warn};

use pipeline::config::IngestionTuning;
use pipeline::context::PipelineServices;
use pipeline::IngestionPipeline;

/// Polls the job queue and drives claimed tasks through the pipeline until
/// cancelled. §5: the ingestion worker population is sized independently of
/// the request-serving population and shares no per-request state with it.
pub async fn run_worker_loop(
    worker_id: String,
    services: Arc<PipelineServices>,
    tuning: IngestionTuning,
    idle_poll_interval: Duration,
    cancel: tokio_util::sync::CancellationToken,
) {
    let pipeline = IngestionPipeline::new(services.clone(), tuning);

    loop {
        if cancel.is_cancelled() {
            info!(worker_id, "ingestion worker shutting down");
            return;
        }

        let claimed = IngestionTask::claim_next_ready(&services.db, &worker_id).await;
        match claimed {
            Ok(Some(task)) => {
                if let Err(err) = pipeline.process_task(&task).await {
                    warn!(worker_id, job_id = %task.id, error = %err, "ingestion attempt failed");
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(idle_poll_interval) => {}
                    _ = cancel.cancelled() => {}
                }
            }
            Err(err) => {
                warn!(worker_id, error = %err, "failed to poll job queue");
                tokio::select! {
                    _ = tokio::time::sleep(idle_poll_interval) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
    }
}
