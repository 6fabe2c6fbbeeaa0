use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use async_openai::types::{CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::error::AppError;
use common::storage::types::api_key::ApiKey;
use common::storage::types::chat_message::{ChatMessage, Role, SourceRef};
use common::storage::types::chat_session::ChatSession;
use common::storage::types::collection::SearchMode;
use futures::{Stream, StreamExt};
use json_stream_parser::JsonStreamParser;
use retrieval_pipeline::RetrievalRequest;
use serde::Deserialize;
use serde_json::json;

use crate::chat_support::{build_chat_messages, chunks_to_context, resolve_mode, answer_response_schema};
use crate::{api_state::ApiState, error::ApiError};

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;
type SseResponse = Sse<KeepAliveStream<EventStream>>;

fn sse_with_keep_alive(stream: EventStream) -> SseResponse {
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}

fn event(kind: &str, payload: serde_json::Value) -> Result<Event, Infallible> {
    Ok(Event::default().event(kind).data(payload.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub collection_id: Option<String>,
    #[serde(default)]
    pub mode: Option<SearchMode>,
    pub top_k: Option<usize>,
}

/// `POST /chat` (§4.4/C6). Session resolution and the user-turn persist
/// happen up front so they can surface as ordinary JSON errors; everything
/// from the retrieval call onward streams as SSE, because by that point
/// the turn is already committed and failures are a per-turn `error`
/// event, not a request failure.
///
/// Cancellation is implicit: this whole turn lives inside one
/// `async_stream` generator. If the client disconnects, axum stops
/// polling it and drops it mid-`.await` — whatever `.await` that happens
/// to be (the LLM call, the persistence write) is simply never resumed,
/// so no assistant message is written and no `done` event is ever
/// produced, matching §4.4's cancellation semantics without any extra
/// bookkeeping.
pub async fn chat(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Json(input): Json<ChatTurnRequest>,
) -> Result<SseResponse, ApiError> {
    if input.message.trim().is_empty() {
        return Err(ApiError::from(AppError::Validation(
            "message must not be empty".to_string(),
        )));
    }

    let session = ChatSession::resolve_or_create(
        &state.db,
        &key.owner,
        input.session_id.as_deref(),
        input.collection_id.clone(),
    )
    .await?;

    // §5: a session's turns are serialized. A second concurrent turn on
    // the same session finds the lock already held and is rejected
    // outright rather than queued — queuing would mean buffering an
    // unbounded number of waiting SSE responses.
    let lock_guard = state
        .session_lock(&session.id)
        .await
        .try_lock_owned()
        .map_err(|_| {
            ApiError::from(AppError::Conflict(
                "a turn is already in progress for this chat session".to_string(),
            ))
        })?;

    let user_position = ChatMessage::next_position(&state.db, &session.id).await?;
    let user_message = ChatMessage::new(
        session.id.clone(),
        key.owner.clone(),
        Role::User,
        input.message.clone(),
        vec![],
        user_position,
    );
    state.db.store_item(user_message).await?;

    let history = ChatMessage::history(&state.db, &session.id, state.config.chat_history_window).await?;
    let mode = resolve_mode(input.mode, &state.config.chat_default_mode);
    let top_k = input.top_k.unwrap_or(state.config.chat_default_top_k);

    let event_stream: EventStream = Box::pin(async_stream::stream! {
        // Held for the whole turn, including the LLM call and the final
        // persist; dropped at the end of this block or, on client
        // disconnect, when axum stops polling and drops the generator.
        let _lock_guard = lock_guard;

        let retrieval = match state.retrieval.retrieve(RetrievalRequest {
            query: input.message.clone(),
            mode,
            top_k,
            owner: key.owner.clone(),
            collection: input.collection_id.clone(),
            metadata_filter: HashMap::new(),
            rerank: false,
        }).await {
            Ok(r) => r,
            Err(err) => {
                yield event("error", json!({"type": "error", "message": err.to_string()}));
                return;
            }
        };

        let context = chunks_to_context(&retrieval.results);
        let messages = build_chat_messages(&history, &context, &input.message);

        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("A single answer field responding to the user's question".into()),
                name: "chat_answer".into(),
                schema: Some(answer_response_schema()),
                strict: Some(true),
            },
        };

        let request = match CreateChatCompletionRequestArgs::default()
            .model(&state.config.llm_model)
            .messages(messages)
            .response_format(response_format)
            .build()
        {
            Ok(r) => r,
            Err(err) => {
                yield event("error", json!({"type": "error", "message": err.to_string()}));
                return;
            }
        };

        let openai_stream = match state.llm_client.chat().create_stream(request).await {
            Ok(s) => s,
            Err(err) => {
                yield event("error", json!({"type": "error", "message": err.to_string()}));
                return;
            }
        };
        tokio::pin!(openai_stream);

        let mut parser = JsonStreamParser::new();
        let mut last_answer = String::new();
        let mut failed = false;

        while let Some(chunk) = openai_stream.next().await {
            let response = match chunk {
                Ok(response) => response,
                Err(err) => {
                    yield event("error", json!({"type": "error", "message": err.to_string()}));
                    failed = true;
                    break;
                }
            };

            let content = response
                .choices
                .first()
                .and_then(|choice| choice.delta.content.clone())
                .unwrap_or_default();
            if content.is_empty() {
                continue;
            }
            for c in content.chars() {
                let _ = parser.add_char(c);
            }
            if let Some(answer) = parser.get_result().get("answer").and_then(|v| v.as_str()) {
                if answer.len() > last_answer.len() {
                    let delta = answer[last_answer.len()..].to_string();
                    last_answer.push_str(&delta);
                    yield event("delta", json!({"type": "delta", "content": delta}));
                }
            }
        }

        if failed {
            return;
        }

        let sources: Vec<SourceRef> = retrieval.results.iter().map(|r| SourceRef {
            chunk_id: r.chunk.id.clone(),
            document_id: r.chunk.document.clone(),
            score: r.score,
            title: None,
        }).collect();
        yield event("sources", json!({"type": "sources", "sources": sources}));

        let assistant_position = match ChatMessage::next_position(&state.db, &session.id).await {
            Ok(p) => p,
            Err(err) => {
                yield event("error", json!({"type": "error", "message": err.to_string()}));
                return;
            }
        };
        let assistant_message = ChatMessage::new(
            session.id.clone(),
            key.owner.clone(),
            Role::Assistant,
            last_answer,
            sources,
            assistant_position,
        );
        if let Err(err) = state.db.store_item(assistant_message).await {
            yield event("error", json!({"type": "error", "message": err.to_string()}));
            return;
        }

        yield event("done", json!({"type": "done", "session_id": session.id}));
    });

    Ok(sse_with_keep_alive(event_stream))
}

pub async fn list_sessions(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = ChatSession::list_by_owner(&state.db, &key.owner).await?;
    Ok(Json(sessions))
}

async fn find_owned_session(state: &ApiState, key: &ApiKey, id: &str) -> Result<ChatSession, ApiError> {
    let session = state
        .db
        .get_item::<ChatSession>(id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("chat session not found".to_string()))?;
    if session.owner != key.owner {
        return Err(ApiError::from(AppError::NotFound(
            "chat session not found".to_string(),
        )));
    }
    Ok(session)
}

pub async fn session_messages(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    find_owned_session(&state, &key, &id).await?;
    let messages = ChatMessage::list_by_session(&state.db, &id).await?;
    Ok(Json(messages))
}

pub async fn delete_session(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    find_owned_session(&state, &key, &id).await?;
    ChatSession::delete_with_messages(&state.db, &id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
