use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use common::error::AppError;
use common::storage::store::content_hash;
use common::storage::types::api_key::ApiKey;
use common::storage::types::document::{Document, DocumentStatus};
use common::storage::types::ingestion_payload::IngestionPayload;
use common::storage::types::ingestion_task::IngestionTask;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::NamedTempFile;

use crate::middleware_auth::require_scope;
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, TryFromMultipart)]
pub struct UploadParams {
    pub collection_id: String,
    pub title: Option<String>,
    pub metadata: Option<String>,
    #[form_data(limit = "unlimited")]
    pub file: FieldData<NamedTempFile>,
}

pub async fn upload(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    TypedMultipart(input): TypedMultipart<UploadParams>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;

    let metadata: HashMap<String, Value> = match input.metadata {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| ApiError::from(AppError::Validation(format!("invalid metadata JSON: {e}"))))?,
        None => HashMap::new(),
    };

    let bytes = tokio::fs::read(input.file.contents.path())
        .await
        .map_err(AppError::from)?;
    if bytes.len() as u64 > state.config.ingest_max_body_bytes as u64 {
        return Err(ApiError::from(AppError::Validation(
            "upload exceeds the maximum allowed size".to_string(),
        )));
    }

    let hash = content_hash(&bytes);
    if let Some(existing) = Document::find_by_owner_and_hash(&state.db, &key.owner, &hash).await? {
        return Err(ApiError::from(AppError::Duplicate {
            existing_id: existing.id,
            message: "a document with this content already exists".to_string(),
        }));
    }

    let filename = input
        .file
        .metadata
        .file_name
        .unwrap_or_else(|| "upload.bin".to_string());
    let mime_type = input
        .file
        .metadata
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let title = input.title.unwrap_or_else(|| filename.clone());

    let blob_key = state.storage.put(bytes.clone().into()).await?;

    let document = Document::new(
        key.owner.clone(),
        input.collection_id.clone(),
        title,
        filename,
        mime_type.clone(),
        bytes.len() as u64,
        hash,
        None,
        blob_key.clone(),
        metadata,
    );
    state.db.store_item(document.clone()).await?;

    IngestionTask::enqueue(
        &state.db,
        IngestionPayload {
            document_id: document.id.clone(),
            owner: key.owner.clone(),
            collection_id: input.collection_id,
            blob_key,
            mime_type,
        },
    )
    .await?;

    let document = Document::transition(
        &state.db,
        &document.id,
        DocumentStatus::Pending,
        DocumentStatus::Queued,
    )
    .await?
    .ok_or_else(|| AppError::InternalError("document left pending state before it could be queued".to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(document)))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub collection_id: String,
    pub status: Option<DocumentStatus>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let documents = Document::list_by_collection(
        &state.db,
        &key.owner,
        &query.collection_id,
        query.status,
        query.limit,
        query.offset,
    )
    .await?;
    Ok(Json(documents))
}

async fn find_owned(state: &ApiState, key: &ApiKey, id: &str) -> Result<Document, ApiError> {
    let document = state
        .db
        .get_item::<Document>(id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;
    if document.owner != key.owner {
        return Err(ApiError::from(AppError::NotFound(
            "document not found".to_string(),
        )));
    }
    Ok(document)
}

pub async fn get(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = find_owned(&state, &key, &id).await?;
    Ok(Json(document))
}

pub async fn status(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = find_owned(&state, &key, &id).await?;
    Ok(Json(json!({
        "status": document.status,
        "processing_info": document.processing_info,
        "chunk_count": document.chunk_count,
        "total_tokens": document.total_tokens,
        "processed_at": document.processed_at,
    })))
}

/// `POST /documents/{id}/cancel` (§4.1 `cancel(document_id)`): best-effort
/// cancel of an in-flight ingestion attempt. A document with no running
/// attempt (already completed, failed, or still only queued) is a no-op,
/// reported as `cancelled: false` rather than an error.
pub async fn cancel(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;
    find_owned(&state, &key, &id).await?;

    let cancelled = ingestion_pipeline::pipeline::cancel_document(&state.db, &id).await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

#[derive(Debug, Deserialize)]
pub struct SignedUrlQuery {
    #[serde(default)]
    pub ttl_secs: Option<i64>,
}

pub async fn signed_url(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let document = find_owned(&state, &key, &id).await?;
    let ttl_secs = query
        .ttl_secs
        .unwrap_or(state.config.signed_url_max_ttl_secs)
        .clamp(1, state.config.signed_url_max_ttl_secs);

    let url = state
        .storage
        .signed_url(&document.blob_key, chrono::Duration::seconds(ttl_secs));
    Ok(Json(json!({ "url": url, "ttl_secs": ttl_secs })))
}

#[derive(Debug, Deserialize)]
pub struct PatchDocumentRequest {
    pub title: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

pub async fn patch(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
    Json(input): Json<PatchDocumentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;
    find_owned(&state, &key, &id).await?;

    let patched = Document::patch(&state.db, &id, input.title, input.metadata)
        .await?
        .ok_or_else(|| AppError::NotFound("document not found".to_string()))?;
    Ok(Json(patched))
}

pub async fn delete(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;
    let document = find_owned(&state, &key, &id).await?;

    Document::delete_with_children(&state.db, &id).await?;
    state.storage.delete(&document.blob_key).await?;
    state.retrieval.invalidate_owner(&key.owner).await;

    Ok(StatusCode::NO_CONTENT)
}
