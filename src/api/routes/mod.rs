//! HTTP route handlers.

pub mod health;
pub mod news;
pub mod stream;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::NewsError;

impl NewsError {
    /// HTTP status a handler answers with when this error reaches it.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NewsError::InvalidPageNumber(_) | NewsError::UnknownDomain(_) => StatusCode::BAD_REQUEST,
            NewsError::UpstreamRateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            NewsError::UpstreamUnavailable { .. } | NewsError::Transport(_) => StatusCode::BAD_GATEWAY,
            NewsError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            NewsError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NewsError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
