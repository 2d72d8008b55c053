pub mod api;
pub mod redirect;

use crate::error::ShortenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// JSON `{"error": msg}` body with the given status.
pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for ShortenError {
    fn into_response(self) -> Response {
        match self {
            ShortenError::InvalidInput(msg) => error_response(StatusCode::BAD_REQUEST, msg),
            ShortenError::NotFound(_) => error_response(StatusCode::NOT_FOUND, "URL not found"),
            ShortenError::DuplicateKey(_) => {
                error_response(StatusCode::CONFLICT, "Short key already taken")
            }
            ShortenError::KeyGenerationExhausted { .. } => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Unable to generate a unique short key",
            ),
            ShortenError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}
