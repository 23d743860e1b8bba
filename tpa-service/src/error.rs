//! Error types for tpa-service HTTP handlers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::formats::IngestError;
use crate::services::UploadError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("{0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("{0}")]
    BadRequest(String),

    /// Upload over the configured size (413)
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// tpa-common error
    #[error("{0}")]
    Common(#[from] tpa_common::Error),
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Ingest(e @ IngestError::UnsupportedFormat(_))
            | UploadError::Ingest(e @ IngestError::UnreadableFile { .. })
            | UploadError::Ingest(e @ IngestError::NoUsableData) => {
                ApiError::BadRequest(e.to_string())
            }
            UploadError::Ingest(e @ IngestError::Io(_)) => ApiError::Internal(e.to_string()),
            e @ UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
            UploadError::Storage(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Common(tpa_common::Error::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg)
            }
            ApiError::Common(tpa_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "COMMON_ERROR",
                    err.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_errors_map_to_status() {
        let unsupported: ApiError =
            UploadError::Ingest(IngestError::UnsupportedFormat("a.txt".to_string())).into();
        assert_eq!(unsupported.into_response().status(), StatusCode::BAD_REQUEST);

        let too_large: ApiError = UploadError::TooLarge { size: 10, limit: 5 }.into();
        assert_eq!(
            too_large.into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );

        let missing: ApiError = tpa_common::Error::NotFound("job".to_string()).into();
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
    }
}
