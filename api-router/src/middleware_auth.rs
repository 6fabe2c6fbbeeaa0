use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use common::error::AppError;
use common::storage::types::api_key::ApiKey;

use crate::{api_state::ApiState, error::ApiError};

/// §6 auth: `Authorization: Bearer <key>` (also accepted via `X-API-Key`
/// for parity with the ingestion-only surface this core's teacher exposed).
/// 401 on missing/invalid key; scope checks happen per-route.
pub async fn bearer_auth(
    State(state): State<ApiState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw_key = extract_api_key(&request)
        .ok_or_else(|| ApiError::from(AppError::Authentication("missing API key".to_string())))?;

    let key = ApiKey::authenticate(&state.db, &raw_key)
        .await?
        .ok_or_else(|| ApiError::from(AppError::Authentication("invalid API key".to_string())))?;

    request.extensions_mut().insert(key);

    Ok(next.run(request).await)
}

/// 403 on scope mismatch (§6). Keys issued via `/auth/register` carry
/// `read`/`write`; routes that mutate state require `write`.
pub fn require_scope(key: &ApiKey, scope: &str) -> Result<(), ApiError> {
    if key.scopes.iter().any(|s| s == scope) {
        Ok(())
    } else {
        Err(ApiError::from(AppError::Permission(format!(
            "missing required scope: {scope}"
        ))))
    }
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|auth| auth.strip_prefix("Bearer "))
                .map(|key| key.trim().to_string())
        })
}
