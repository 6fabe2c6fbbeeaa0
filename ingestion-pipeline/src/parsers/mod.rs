mod audio;
mod image;
mod office;
mod pdf;
mod text;
mod video;

use common::error::AppError;

/// §9 redesign note: the dynamic MIME-keyed parser registry becomes a
/// tagged variant plus a total selection function. No runtime reflection,
/// no parser plugin trait object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    Pdf,
    Office,
    Audio,
    Image,
    Video,
    Text,
}

impl std::fmt::Display for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pdf => "pdf",
            Self::Office => "office",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ParsedContent {
    pub parser: Parser,
    pub text: String,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
    pub page_count: Option<u32>,
}

/// Selection is total: anything not recognized falls back to `Text`,
/// matching §9's "selection is total (a fallback always exists)".
pub fn select(mime_type: &str) -> Parser {
    match mime_type {
        "application/pdf" => Parser::Pdf,
        "application/msword"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            Parser::Office
        }
        m if m.starts_with("audio/") => Parser::Audio,
        m if m.starts_with("image/") => Parser::Image,
        m if m.starts_with("video/") => Parser::Video,
        _ => Parser::Text,
    }
}

impl Parser {
    pub async fn parse(self, bytes: &[u8]) -> Result<ParsedContent, AppError> {
        let mut parsed = match self {
            Self::Pdf => pdf::parse(bytes),
            Self::Office => office::parse(bytes),
            Self::Audio => audio::parse(bytes),
            Self::Image => image::parse(bytes),
            Self::Video => video::parse(bytes),
            Self::Text => text::parse(bytes),
        }?;
        parsed.parser = self;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_total() {
        assert_eq!(select("application/pdf"), Parser::Pdf);
        assert_eq!(select("image/png"), Parser::Image);
        assert_eq!(select("audio/wav"), Parser::Audio);
        assert_eq!(select("video/mp4"), Parser::Video);
        assert_eq!(select("text/plain"), Parser::Text);
        assert_eq!(select("application/x-totally-unknown"), Parser::Text);
    }
}
