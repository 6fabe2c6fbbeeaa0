use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

/// Core internal error type. Every stage, store, and provider adapter in
/// the core converts into this; `api-router::error::ApiError` is the only
/// place it is mapped onto an HTTP status and the §7 error envelope.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Authentication error: {0}")]
    Authentication(String),
    #[error("Permission error: {0}")]
    Permission(String),
    #[error("Duplicate: {0}")]
    Duplicate { existing_id: String, message: String },
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Transient upstream error: {0}")]
    TransientUpstream(String),
    #[error("Permanent upstream error: {0}")]
    PermanentUpstream(String),
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),
    #[error("Cancelled: {0}")]
    Cancelled(String),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("Processing error: {0}")]
    Processing(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Stable error-class code used in the §6/§7 error envelope. Kept
    /// distinct from the `Display` message, which may be more specific.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidFilter(_) | Self::DimensionMismatch { .. } => {
                "invalid_request_error"
            }
            Self::Authentication(_) => "authentication_error",
            Self::Permission(_) => "permission_error",
            Self::NotFound(_) => "not_found_error",
            Self::Duplicate { .. } => "invalid_request_error",
            Self::Conflict(_) => "conflict_error",
            Self::RateLimited(_) => "rate_limit_error",
            Self::TransientUpstream(_) | Self::PermanentUpstream(_) => "server_error",
            Self::Cancelled(_) => "server_error",
            _ => "server_error",
        }
    }

    /// Whether an ingestion attempt that hit this error is worth retrying
    /// under §4.1's failure semantics. Permanent errors fail the document
    /// without consuming further attempts.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientUpstream(_) | Self::Database(_) | Self::Reqwest(_) | Self::OpenAI(_)
        )
    }
}
