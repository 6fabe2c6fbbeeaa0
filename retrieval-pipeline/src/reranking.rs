use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::available_parallelism;

use common::error::AppError;
use common::utils::config::AppConfig;
use fastembed::{RerankInitOptions, RerankResult, TextRerank};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

static NEXT_ENGINE: AtomicUsize = AtomicUsize::new(0);

fn pick_engine_index(pool_len: usize) -> usize {
    NEXT_ENGINE.fetch_add(1, Ordering::Relaxed) % pool_len
}

/// §4.2 reranking: a pool of cross-encoder engines, checked out under a
/// semaphore so concurrent rerank calls don't oversubscribe CPU.
pub struct RerankerPool {
    engines: Vec<Arc<Mutex<TextRerank>>>,
    semaphore: Arc<Semaphore>,
}

impl RerankerPool {
    pub fn maybe_from_config(config: &AppConfig) -> Result<Option<Arc<Self>>, AppError> {
        if !config.reranking_enabled {
            return Ok(None);
        }
        let pool_size = config.reranking_pool_size.max(1).min(default_pool_size().max(1) * 4);
        let mut options = RerankInitOptions::default();
        options.cache_dir = PathBuf::from(&config.fastembed_cache_dir);
        std::fs::create_dir_all(&options.cache_dir)?;

        Self::new_with_options(pool_size, options).map(Some)
    }

    fn new_with_options(pool_size: usize, options: RerankInitOptions) -> Result<Arc<Self>, AppError> {
        if pool_size == 0 {
            return Err(AppError::Validation(
                "reranking pool size must be greater than zero".to_string(),
            ));
        }
        let mut engines = Vec::with_capacity(pool_size);
        for index in 0..pool_size {
            debug!(index, "creating reranking engine");
            let model = TextRerank::try_new(options.clone())
                .map_err(|e| AppError::InternalError(e.to_string()))?;
            engines.push(Arc::new(Mutex::new(model)));
        }
        Ok(Arc::new(Self {
            engines,
            semaphore: Arc::new(Semaphore::new(pool_size)),
        }))
    }

    pub async fn checkout(self: &Arc<Self>) -> RerankerLease {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed");
        let index = pick_engine_index(self.engines.len());
        RerankerLease {
            _permit: permit,
            engine: self.engines[index].clone(),
        }
    }
}

fn default_pool_size() -> usize {
    available_parallelism().map(|v| v.get().min(2)).unwrap_or(2).max(1)
}

/// Active lease on a single `TextRerank` instance; dropping it releases the
/// semaphore permit.
pub struct RerankerLease {
    _permit: OwnedSemaphorePermit,
    engine: Arc<Mutex<TextRerank>>,
}

impl RerankerLease {
    /// §4.2: "pass (query, chunk-text) pairs to a cross-encoder scorer,
    /// reorder by the new score". Rerank failure is the caller's job to
    /// degrade on, not this method's — it returns the error untouched.
    pub async fn rerank(&self, query: &str, documents: Vec<String>) -> Result<Vec<RerankResult>, AppError> {
        let mut guard = self.engine.lock().await;
        guard
            .rerank(query.to_owned(), documents, false, None)
            .map_err(|e| AppError::InternalError(e.to_string()))
    }
}
