use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;

use crate::error::AppError;
use crate::utils::config::AppConfig;

/// The embedding-provider collaborator contract from §6: `embed_batch`
/// returns one fixed-dimension vector per input, in order. All embeddings
/// for a document use the same provider/model (§4.1 stage 5).
#[derive(Clone)]
pub struct EmbeddingProvider {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &AppConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.embedding_api_key);
        if let Some(base_url) = &config.embedding_base_url {
            openai_config = openai_config.with_api_base(base_url);
        }
        Self {
            client: Client::with_config(openai_config),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embeds a batch (§4.1: batch size ≤ 100, caller enforces). Each
    /// returned vector's length must equal `self.dimension`; a provider
    /// that disagrees is a permanent configuration error, not per-call.
    pub async fn embed_batch(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(inputs)
            .build()
            .map_err(AppError::OpenAI)?;
        let response = self.client.embeddings().create(request).await?;

        let mut sorted = response.data;
        sorted.sort_by_key(|e| e.index);
        let vectors = sorted
            .into_iter()
            .map(|e| e.embedding)
            .collect::<Vec<_>>();

        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(AppError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }

    pub async fn embed_one(&self, input: String) -> Result<Vec<f32>, AppError> {
        let mut vectors = self.embed_batch(vec![input]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::InternalError("embedding provider returned no vectors".into()))
    }
}
