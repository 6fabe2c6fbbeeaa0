use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use common::error::AppError;
use common::storage::types::api_key::ApiKey;
use common::storage::types::collection::{Collection, CollectionConfig};
use serde::Deserialize;
use serde_json::Value;

use crate::middleware_auth::require_scope;
use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub config: Option<CollectionConfig>,
}

#[derive(Debug, Deserialize)]
pub struct ListCollectionsQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Deserialize)]
pub struct PatchCollectionRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
}

pub async fn create(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Json(input): Json<CreateCollectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;
    if input.name.trim().is_empty() {
        return Err(ApiError::from(AppError::Validation(
            "name must not be empty".to_string(),
        )));
    }
    if Collection::find_by_owner_and_name(&state.db, &key.owner, &input.name)
        .await?
        .is_some()
    {
        return Err(ApiError::from(AppError::Validation(
            "a collection with this name already exists".to_string(),
        )));
    }

    let collection = Collection::new(
        key.owner.clone(),
        input.name,
        input.description,
        input.metadata,
        input.config.unwrap_or_default(),
    );
    state.db.store_item(collection.clone()).await?;

    Ok((StatusCode::CREATED, Json(collection)))
}

pub async fn list(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Query(query): Query<ListCollectionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let collections = Collection::list_by_owner(&state.db, &key.owner, query.limit, query.offset).await?;
    Ok(Json(collections))
}

async fn find_owned(state: &ApiState, key: &ApiKey, id: &str) -> Result<Collection, ApiError> {
    let collection = state
        .db
        .get_item::<Collection>(id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound("collection not found".to_string()))?;
    if collection.owner != key.owner {
        return Err(ApiError::from(AppError::NotFound(
            "collection not found".to_string(),
        )));
    }
    Ok(collection)
}

pub async fn get(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let collection = find_owned(&state, &key, &id).await?;
    Ok(Json(collection))
}

pub async fn patch(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
    Json(input): Json<PatchCollectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;
    find_owned(&state, &key, &id).await?;

    let patched = Collection::patch(&state.db, &id, input.name, input.description, input.metadata)
        .await?
        .ok_or_else(|| AppError::NotFound("collection not found".to_string()))?;
    Ok(Json(patched))
}

pub async fn delete(
    State(state): State<ApiState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_scope(&key, "write")?;
    find_owned(&state, &key, &id).await?;

    Collection::delete_cascade(&state.db, &id).await?;
    state.retrieval.invalidate_owner(&key.owner).await;

    Ok(StatusCode::NO_CONTENT)
}
