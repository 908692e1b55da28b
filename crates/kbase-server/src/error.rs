//! Mapping from `kbase_core::Error` to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{error, warn};

use kbase_core::Error;

/// Handler error; renders as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::InvalidInput(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Dependency { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} {}", status.as_u16(), self.0);
        } else {
            warn!("{} {}", status.as_u16(), self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
