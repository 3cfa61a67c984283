//! Errors surfaced by the HTTP front end.
//!
//! Only control endpoints and request conversion produce these. Intercepted
//! requests always end in a response from the worker.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// Malformed control message or unusable request target.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Request body exceeded the configured limit.
    #[error("BODY_TOO_LARGE: limit {0} bytes")]
    BodyTooLarge(usize),

    #[error("INTERNAL: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            HttpError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            HttpError::InvalidInput(_) => "invalid_input",
            HttpError::BodyTooLarge(_) => "body_too_large",
            HttpError::Internal(_) => "internal",
        }
    }
}

impl From<seamcache_core::Error> for HttpError {
    fn from(err: seamcache_core::Error) -> Self {
        match err {
            seamcache_core::Error::InvalidInput(msg) => HttpError::InvalidInput(msg),
            seamcache_core::Error::InvalidUrl(msg) => HttpError::InvalidInput(msg),
            other => HttpError::Internal(other.to_string()),
        }
    }
}

impl From<seamcache_client::UrlError> for HttpError {
    fn from(err: seamcache_client::UrlError) -> Self {
        HttpError::InvalidInput(err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorBody { code: self.code(), message: self.to_string() };
        (status, Json(body)).into_response()
    }
}
