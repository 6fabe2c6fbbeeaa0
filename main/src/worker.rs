use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use common::storage::db::SurrealDbClient;
use common::storage::store::StorageManager;
use common::utils::config::{AppConfig, BlobStoreKind};
use common::utils::embedding::EmbeddingProvider;
use ingestion_pipeline::pipeline::config::IngestionTuning;
use ingestion_pipeline::pipeline::context::PipelineServices;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// The ingestion binary: a pool of workers that claim queued jobs and drive
/// them through the pipeline (§4.1, §5). Scales independently of the
/// request-serving `server` binary and shares no per-request state with it.
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = AppConfig::load()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized(config.embedding_dimension).await?;

    let storage = match config.blob_store_kind {
        BlobStoreKind::Memory => StorageManager::in_memory(
            config.blob_signing_secret.clone(),
            config.public_base_url.clone(),
        ),
        BlobStoreKind::Local => StorageManager::local(
            std::path::Path::new(&config.blob_store_root),
            config.blob_signing_secret.clone(),
            config.public_base_url.clone(),
        )?,
    };

    let embedding = EmbeddingProvider::new(&config);

    let mut llm_config = OpenAIConfig::new().with_api_key(&config.llm_api_key);
    if let Some(base_url) = &config.llm_base_url {
        llm_config = llm_config.with_api_base(base_url);
    }
    let openai_client = async_openai::Client::with_config(llm_config);

    let services = Arc::new(PipelineServices {
        db,
        storage,
        embedding,
        openai_client,
    });
    let tuning = IngestionTuning::from(&config);
    let cancel = CancellationToken::new();

    let mut workers = Vec::with_capacity(config.ingest_worker_count);
    for index in 0..config.ingest_worker_count {
        let worker_id = format!("ingestion-worker-{index}");
        let services = services.clone();
        let tuning = tuning.clone();
        let cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            ingestion_pipeline::run_worker_loop(worker_id, services, tuning, IDLE_POLL_INTERVAL, cancel).await;
        }));
    }

    tracing::info!(count = config.ingest_worker_count, "ingestion workers started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining ingestion workers");
    cancel.cancel();

    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}
