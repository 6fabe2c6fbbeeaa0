use super::{ParsedContent, Parser};
use common::error::AppError;

pub fn parse(bytes: &[u8]) -> Result<ParsedContent, AppError> {
    let text = String::from_utf8_lossy(bytes).into_owned();
    Ok(ParsedContent {
        parser: Parser::Text,
        text,
        metadata: std::collections::HashMap::new(),
        page_count: None,
    })
}
