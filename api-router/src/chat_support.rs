use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
};
use common::storage::types::chat_message::{ChatMessage, Role};
use common::storage::types::collection::SearchMode;
use retrieval_pipeline::RetrievedChunk;
use serde_json::{json, Value};

/// The turn's system preamble (§4.4 "system preamble + last N messages +
/// retrieved chunks as labeled context"). The model is told explicitly to
/// stay inside the supplied context rather than fall back on its own
/// knowledge.
pub const CHAT_SYSTEM_PREAMBLE: &str = "You are a retrieval-augmented assistant. Answer the \
user's question using only the numbered context passages below; if the passages don't contain \
the answer, say you don't know. Respond with a JSON object of the shape {\"answer\": \"...\"} \
and nothing else.";

/// The structured-output schema constraining the model to a single
/// `answer` field, mirroring the extraction pipeline's use of
/// `ResponseFormat::JsonSchema` for parseable LLM output.
pub fn answer_response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": { "type": "string" }
        },
        "required": ["answer"],
        "additionalProperties": false
    })
}

/// Renders retrieved chunks as numbered, labeled context passages the
/// model can cite back against.
pub fn chunks_to_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, retrieved)| {
            format!(
                "[{}] (document: {}, chunk: {})\n{}",
                i + 1,
                retrieved.chunk.document,
                retrieved.chunk.id,
                retrieved.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn to_request_message(message: &ChatMessage) -> ChatCompletionRequestMessage {
    match message.role {
        Role::User => ChatCompletionRequestUserMessage::from(message.content.as_str()).into(),
        Role::Assistant => {
            ChatCompletionRequestAssistantMessage::from(message.content.as_str()).into()
        }
        Role::System => ChatCompletionRequestSystemMessage::from(message.content.as_str()).into(),
    }
}

/// Builds the full message list for the turn: system preamble, prior
/// history (already windowed to `chat_history_window` by the caller), and
/// the current turn as a user message carrying the retrieved context.
pub fn build_chat_messages(
    history: &[ChatMessage],
    context: &str,
    user_question: &str,
) -> Vec<ChatCompletionRequestMessage> {
    let mut messages = vec![ChatCompletionRequestSystemMessage::from(CHAT_SYSTEM_PREAMBLE).into()];
    messages.extend(history.iter().map(to_request_message));

    let turn = if context.is_empty() {
        user_question.to_string()
    } else {
        format!("Context:\n{context}\n\nQuestion: {user_question}")
    };
    messages.push(ChatCompletionRequestUserMessage::from(turn.as_str()).into());
    messages
}

pub fn resolve_mode(requested: Option<SearchMode>, default: &str) -> SearchMode {
    requested.unwrap_or_else(|| match default {
        "semantic" => SearchMode::Semantic,
        "keyword" => SearchMode::Keyword,
        "hierarchical" => SearchMode::Hierarchical,
        "graph" => SearchMode::Graph,
        _ => SearchMode::Hybrid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::chunk::Chunk;
    use std::collections::HashMap;

    #[test]
    fn context_numbers_passages_in_order() {
        let chunks = vec![
            RetrievedChunk {
                chunk: Chunk::new(
                    "doc-1".into(),
                    "owner-1".into(),
                    "collection-1".into(),
                    0,
                    "first passage".into(),
                    vec![0.1],
                    3,
                    None,
                    None,
                    HashMap::new(),
                ),
                score: 0.9,
            },
            RetrievedChunk {
                chunk: Chunk::new(
                    "doc-1".into(),
                    "owner-1".into(),
                    "collection-1".into(),
                    1,
                    "second passage".into(),
                    vec![0.1],
                    3,
                    None,
                    None,
                    HashMap::new(),
                ),
                score: 0.8,
            },
        ];
        let context = chunks_to_context(&chunks);
        assert!(context.starts_with("[1]"));
        assert!(context.contains("[2]"));
        assert!(context.contains("second passage"));
    }

    #[test]
    fn resolve_mode_falls_back_to_configured_default() {
        assert_eq!(resolve_mode(None, "keyword"), SearchMode::Keyword);
        assert_eq!(resolve_mode(Some(SearchMode::Graph), "keyword"), SearchMode::Graph);
        assert_eq!(resolve_mode(None, "unknown"), SearchMode::Hybrid);
    }
}
