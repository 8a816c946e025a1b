//! HTTP error type.
//!
//! Handlers return `Result<T, ApiError>`; the error renders as
//! `{"detail": "..."}` with 401 for a bad token and 400 for everything else.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::FetchError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: "Invalid token".to_string(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    /// Map a pipeline error for a `<what> download` request
    pub fn from_fetch(err: FetchError, what: &str) -> Self {
        match err {
            FetchError::Unauthorized => {
                tracing::warn!("Rejected {} request with invalid token", what);
                Self::unauthorized()
            }
            other => {
                tracing::warn!(error = %other, "{} request failed", what);
                Self::bad_request(format!("Error during {} download: {}", what, other))
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
