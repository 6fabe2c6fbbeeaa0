use super::ParsedContent;
use common::error::AppError;

/// Video transcription is an external collaborator's job (§1 Non-goals).
pub fn parse(_bytes: &[u8]) -> Result<ParsedContent, AppError> {
    Err(AppError::PermanentUpstream(
        "video transcription is not implemented by this core".to_string(),
    ))
}
