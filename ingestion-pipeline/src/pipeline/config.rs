use common::utils::config::AppConfig;

/// Tuning knobs for retry backoff and batching, derived from `AppConfig` at
/// worker startup. Kept as its own struct (rather than threading
/// `AppConfig` through every stage) so stage functions stay unit-testable
/// with small, explicit fixtures.
#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub max_attempts: u32,
    pub embed_batch_size: usize,
    pub embed_batch_timeout_secs: u64,
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    pub llm_model: String,
}

impl From<&AppConfig> for IngestionTuning {
    fn from(config: &AppConfig) -> Self {
        Self {
            retry_base_delay_secs: config.ingest_retry_base_delay_secs,
            retry_max_delay_secs: config.ingest_retry_max_delay_secs,
            max_attempts: config.ingest_max_attempts,
            embed_batch_size: config.ingest_embed_batch_size,
            embed_batch_timeout_secs: config.ingest_embed_batch_timeout_secs,
            chunk_size_tokens: 500,
            chunk_overlap_tokens: 50,
            llm_model: config.llm_model.clone(),
        }
    }
}

impl IngestionTuning {
    /// Exponential backoff starting at `retry_base_delay_secs`, capped at
    /// `retry_max_delay_secs` (§4.1: "default 3 [attempts]... exponential
    /// backoff starting at 60s").
    pub fn retry_delay(&self, attempt: u32) -> std::time::Duration {
        let exponent = attempt.saturating_sub(1).min(5);
        let scaled = self.retry_base_delay_secs.saturating_mul(1u64 << exponent);
        std::time::Duration::from_secs(scaled.min(self.retry_max_delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_then_caps() {
        let tuning = IngestionTuning {
            retry_base_delay_secs: 60,
            retry_max_delay_secs: 900,
            max_attempts: 3,
            embed_batch_size: 100,
            embed_batch_timeout_secs: 300,
            chunk_size_tokens: 500,
            chunk_overlap_tokens: 50,
            llm_model: "gpt-4o-mini".to_string(),
        };
        assert_eq!(tuning.retry_delay(1).as_secs(), 60);
        assert_eq!(tuning.retry_delay(2).as_secs(), 120);
        assert_eq!(tuning.retry_delay(10).as_secs(), 900);
    }
}
