use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common::error::AppError;
use serde_json::{json, Value};

/// Maps the internal error type onto the §6/§7 HTTP envelope
/// (`{"error":{"type","code","message","details?"}}`). `type` is the
/// stable error class from `AppError::code()`; `code` is a finer-grained,
/// still-stable token for the specific failure.
pub struct ApiError(AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) | AppError::InvalidFilter(_) | AppError::DimensionMismatch { .. } | AppError::Duplicate { .. } => {
            StatusCode::BAD_REQUEST
        }
        AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
        AppError::Permission(_) => StatusCode::FORBIDDEN,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn specific_code(err: &AppError) -> &'static str {
    match err {
        AppError::Validation(_) => "validation_error",
        AppError::InvalidFilter(_) => "invalid_filter",
        AppError::DimensionMismatch { .. } => "dimension_mismatch",
        AppError::Duplicate { .. } => "duplicate_content",
        AppError::Authentication(_) => "authentication_error",
        AppError::Permission(_) => "permission_error",
        AppError::NotFound(_) => "not_found",
        AppError::RateLimited(_) => "rate_limited",
        AppError::Conflict(_) => "concurrent_turn",
        AppError::TransientUpstream(_) => "transient_upstream",
        AppError::PermanentUpstream(_) => "permanent_upstream",
        AppError::Cancelled(_) => "cancelled",
        _ => "internal_error",
    }
}

fn details_for(err: &AppError) -> Option<Value> {
    match err {
        AppError::Duplicate { existing_id, .. } => Some(json!({ "existing_id": existing_id })),
        AppError::DimensionMismatch { expected, actual } => {
            Some(json!({ "expected": expected, "actual": actual }))
        }
        _ => None,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(&err);

        // §7: sensitive values and stack traces never reach the response
        // body; an internal error's message is generic, detail goes to logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "internal error");
            "an internal error occurred".to_string()
        } else {
            err.to_string()
        };

        let mut body = json!({
            "error": {
                "type": err.code(),
                "code": specific_code(&err),
                "message": message,
            }
        });
        if let Some(details) = details_for(&err) {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_400() {
        let response = ApiError::from(AppError::Validation("bad input".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn authentication_error_maps_to_401() {
        let response = ApiError::from(AppError::Authentication("no key".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn permission_error_maps_to_403() {
        let response = ApiError::from(AppError::Permission("not yours".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::from(AppError::NotFound("missing".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_maps_to_429() {
        let response = ApiError::from(AppError::RateLimited("slow down".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn conflict_maps_to_409() {
        let response = ApiError::from(AppError::Conflict("turn already in flight".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn internal_error_message_is_generic() {
        let response = ApiError::from(AppError::InternalError("db password leaked here".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
