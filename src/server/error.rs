//! Mapping of chat errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::chat::error::ChatError;
use crate::server::dto::ErrorResponse;

/// Error returned by route handlers.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            ChatError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            ChatError::Configuration(_) => (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable"),
            ChatError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ChatError::Backend(_) => (StatusCode::INTERNAL_SERVER_ERROR, "backend_error"),
            ChatError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.parts();
        let detail = self.0.to_string();

        if status.is_server_error() {
            error!(status = status.as_u16(), %detail, "Request failed");
        } else {
            warn!(status = status.as_u16(), %detail, "Request rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error: kind.to_string(),
                detail,
            }),
        )
            .into_response()
    }
}
