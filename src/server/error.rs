use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::artifacts::ArtifactError;
use crate::pipeline::PipelineError;

/// Error type for all route handlers, rendered as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    PayloadTooLarge(String),
    Internal(String),
    /// Extraction failed; the model reply preview is returned for diagnosis.
    Extraction {
        message: String,
        raw_response: Option<String>,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<String>,
}

impl ApiError {
    /// Map an axum extractor rejection, keeping the size-limit status.
    pub fn rejection(status: StatusCode, message: String) -> Self {
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(message)
        } else {
            ApiError::BadRequest(message)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, raw_response) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => {
                tracing::warn!("rejected request: {msg}");
                (StatusCode::BAD_REQUEST, msg, None)
            }
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg, None),
            // model and parser messages are passed through to the caller
            ApiError::Internal(msg) => {
                tracing::error!("processing error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
            ApiError::Extraction {
                message,
                raw_response,
            } => {
                tracing::error!("extraction failed: {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message, raw_response)
            }
        };

        let body = ErrorBody {
            error: message,
            raw_response,
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::BadRequest(msg) => ApiError::BadRequest(msg),
            PipelineError::Processing(msg) => ApiError::Internal(msg),
            PipelineError::Extraction {
                message,
                raw_response,
            } => ApiError::Extraction {
                message,
                raw_response,
            },
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::NotFound | ArtifactError::InvalidName => {
                ApiError::NotFound("File not found".to_string())
            }
            other => ApiError::Internal(format!("Download error: {other}")),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        ApiError::rejection(e.status(), e.body_text())
    }
}
