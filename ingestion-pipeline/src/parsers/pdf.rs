use super::{ParsedContent, Parser};
use common::error::AppError;

/// Minimal text extraction via `pdf-extract`. Layout-aware extraction,
/// OCR for scanned pages, and embedded-image handling are out of scope
/// (§1 Non-goals: "per-format parsing algorithms").
pub fn parse(bytes: &[u8]) -> Result<ParsedContent, AppError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| AppError::PermanentUpstream(format!("pdf parse failed: {e}")))?;

    let page_count = lopdf::Document::load_mem(bytes)
        .ok()
        .map(|doc| doc.get_pages().len() as u32);

    Ok(ParsedContent {
        parser: Parser::Pdf,
        text,
        metadata: std::collections::HashMap::new(),
        page_count,
    })
}
