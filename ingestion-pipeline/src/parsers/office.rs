use super::ParsedContent;
use common::error::AppError;

/// Office document bodies (docx/xlsx/pptx) are zipped XML; extracting them
/// correctly is a per-format parsing algorithm and explicitly out of scope
/// (§1 Non-goals). This variant exists so `select()` stays total and the
/// failure is a clear, attributable `permanent_upstream` rather than a
/// silent `Text` fallback over binary bytes.
pub fn parse(_bytes: &[u8]) -> Result<ParsedContent, AppError> {
    Err(AppError::PermanentUpstream(
        "office document parsing is not implemented by this core".to_string(),
    ))
}
