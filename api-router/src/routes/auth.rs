use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use common::error::AppError;
use common::storage::types::api_key::ApiKey;
use common::storage::types::user::User;
use serde::Deserialize;
use serde_json::json;

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// `POST /auth/register` (§6). Creates the user and, in the same call,
/// issues a first API key scoped `read`+`write` — there is no separate
/// key-management surface in this core, so registration is the only
/// moment the raw key is ever visible.
pub async fn register(
    State(state): State<ApiState>,
    Json(input): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.config.registration_enabled {
        return Err(ApiError::from(AppError::Permission(
            "registration is disabled".to_string(),
        )));
    }
    if input.email.trim().is_empty() || input.password.len() < 8 {
        return Err(ApiError::from(AppError::Validation(
            "email must be non-empty and password must be at least 8 characters".to_string(),
        )));
    }

    let user = User::register(&state.db, input.email, input.password).await?;

    let issued = ApiKey::issue(user.id.clone(), vec!["read".to_string(), "write".to_string()]);
    state.db.store_item(issued.record).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user_id": user.id,
            "api_key": issued.raw_key,
        })),
    ))
}
