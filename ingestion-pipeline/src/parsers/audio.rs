use super::ParsedContent;
use common::error::AppError;

/// Transcription is an external collaborator's job (§1 Non-goals); this
/// core only knows how to route audio MIME types to a parser that fails
/// cleanly rather than mis-handling binary bytes as text.
pub fn parse(_bytes: &[u8]) -> Result<ParsedContent, AppError> {
    Err(AppError::PermanentUpstream(
        "audio transcription is not implemented by this core".to_string(),
    ))
}
