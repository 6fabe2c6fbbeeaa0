use std::net::SocketAddr;

use api_router::api_state::ApiState;
use common::error::AppError;
use common::storage::store::StorageManager;
use common::utils::config::{AppConfig, BlobStoreKind};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// The request-serving binary: HTTP API plus SSE chat. Ingestion runs in
/// the separate `worker` binary so the two populations scale independently
/// (§5).
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = AppConfig::load()?;
    let storage = build_storage(&config)?;
    let api_state = ApiState::new(&config, storage).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let app = api_router::api_routes_v1(&api_state).with_state(api_state);

    tracing::info!(%addr, "starting mnemosyne server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_storage(config: &AppConfig) -> Result<StorageManager, AppError> {
    match config.blob_store_kind {
        BlobStoreKind::Memory => Ok(StorageManager::in_memory(
            config.blob_signing_secret.clone(),
            config.public_base_url.clone(),
        )),
        BlobStoreKind::Local => StorageManager::local(
            std::path::Path::new(&config.blob_store_root),
            config.blob_signing_secret.clone(),
            config.public_base_url.clone(),
        ),
    }
}
