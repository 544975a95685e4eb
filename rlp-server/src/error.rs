//! HTTP error type
//!
//! Every handler returns [`ApiResult`]. Errors render as
//! `{"error": {"code", "message"}}`; validation failures add `fields`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rlp_common::validation::ValidationErrors;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 404
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 400, malformed request or parameter
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// 422, well-formed request with invalid field values
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// 409, operation conflicts with current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 500
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<rlp_common::Error> for ApiError {
    fn from(err: rlp_common::Error) -> Self {
        use rlp_common::Error;
        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Validation(errors) => ApiError::Validation(errors),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            Error::Database(e) => ApiError::Database(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

/// Unique-constraint violations surface as conflicts
fn database_status(err: &sqlx::Error) -> (StatusCode, &'static str) {
    if let sqlx::Error::Database(db_err) = err {
        if db_err.is_unique_violation() {
            return (StatusCode::CONFLICT, "CONFLICT");
        }
        if db_err.is_foreign_key_violation() {
            return (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR");
        }
    }
    (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, fields) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                errors.to_string(),
                Some(errors.errors),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiError::Database(ref err) => {
                let (status, code) = database_status(err);
                if status.is_server_error() {
                    error!("Database error: {}", err);
                }
                (status, code, err.to_string(), None)
            }
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(fields) = fields {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
