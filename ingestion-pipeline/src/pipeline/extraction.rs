use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
};
use async_openai::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;

use common::error::AppError;

const EXTRACTION_SYSTEM_MESSAGE: &str = "You extract the named entities and relationships \
mentioned in a document so they can be indexed for knowledge-graph retrieval. Only extract \
entities with a clear referent in the text; prefer precision over recall.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub key: String,
    pub name: String,
    pub description: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

fn extraction_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "entities": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "key": { "type": "string" },
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "entity_type": { "type": "string" }
                    },
                    "required": ["key", "name", "description", "entity_type"],
                    "additionalProperties": false
                }
            },
            "relationships": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "type": { "type": "string" },
                        "source": { "type": "string" },
                        "target": { "type": "string" }
                    },
                    "required": ["type", "source", "target"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["entities", "relationships"],
        "additionalProperties": false
    })
}

/// Extracts entities and relationships from `text` via a structured-output
/// chat completion (§9 redesign note: graph mode is opt-in, so this is only
/// ever invoked for collections that enable it).
pub async fn extract(
    client: &Client<OpenAIConfig>,
    model: &str,
    text: &str,
) -> Result<ExtractionResult, AppError> {
    let response_format = ResponseFormat::JsonSchema {
        json_schema: ResponseFormatJsonSchema {
            description: Some("Entities and relationships mentioned in the document".into()),
            name: "graph_extraction".into(),
            schema: Some(extraction_schema()),
            strict: Some(true),
        },
    };

    let request = CreateChatCompletionRequestArgs::default()
        .model(model)
        .messages([
            ChatCompletionRequestSystemMessage::from(EXTRACTION_SYSTEM_MESSAGE).into(),
            ChatCompletionRequestUserMessage::from(text).into(),
        ])
        .response_format(response_format)
        .build()
        .map_err(AppError::OpenAI)?;

    let response = client.chat().create(request).await?;
    let content = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.as_ref())
        .ok_or_else(|| AppError::TransientUpstream("no content in extraction response".into()))?;

    serde_json::from_str(content)
        .map_err(|e| AppError::TransientUpstream(format!("failed to parse extraction response: {e}")))
}
