//! HTTP error types for the txlog server.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::Error;

/// Error wrapper for converting log errors to HTTP responses.
///
/// Error responses have the format:
/// ```json
/// { "status": "error", "message": "..." }
/// ```
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub(super) fn status_code(&self) -> StatusCode {
        match &self.0 {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Storage(_)
            | Error::Encoding(_)
            | Error::PartialWrite { .. }
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "status": "error",
            "message": self.0.to_string()
        });

        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}
