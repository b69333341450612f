//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, serde_json::json!({ "error": msg }))
            }
            ApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
            }
            ApiError::Domain(err) => domain_error_to_response(err),
        };

        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, serde_json::Value) {
    let status = match &err {
        DomainError::ValidationFailed { field, message } => {
            let body = serde_json::json!({ "error": message, "field": field });
            return (StatusCode::BAD_REQUEST, body);
        }
        DomainError::EmptyOrder => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. }
        | DomainError::CustomerNotFound(_)
        | DomainError::ProductNotFound(_)
        | DomainError::FileNotFound(_) => StatusCode::NOT_FOUND,
        DomainError::AlreadyExists { .. } | DomainError::ConcurrencyConflict { .. } => {
            StatusCode::CONFLICT
        }
        DomainError::RelocationInconsistency { .. }
        | DomainError::Store(_)
        | DomainError::Storage(_) => {
            tracing::error!(error = %err, "internal server error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, serde_json::json!({ "error": err.to_string() }))
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}
