//! Error taxonomy shared by the pipeline, the worker, and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing/empty question, unknown search mode. Surfaced as 400.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown job id or file not owned by the requester. Surfaced as 404.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Redis is down. Absorbed by synchronous fallback at the HTTP surface;
    /// never surfaces to the client as an error.
    #[error("Job queue unavailable")]
    QueueUnavailable,

    /// Embedding service unhealthy; fatal to vector/hybrid modes.
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Vector store unavailable: {0}")]
    VectorUnavailable(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    /// Per-request timeout on an outbound call; treated like unavailability.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Unexpected invariant violation (wrong vector dimension, malformed
    /// JSON in Redis).
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable machine-readable code used in error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "INVALID_INPUT",
            Error::NotFound(_) => "NOT_FOUND",
            Error::QueueUnavailable => "UNAVAILABLE_QUEUE",
            Error::EmbeddingUnavailable(_) => "UNAVAILABLE_EMBED",
            Error::VectorUnavailable(_) => "UNAVAILABLE_VECTOR",
            Error::LlmUnavailable(_) => "UNAVAILABLE_LLM",
            Error::Timeout(_) => "TIMEOUT",
            Error::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::new_v4().to_string();
        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, request_id, "request failed");
        }
        let body = serde_json::json!({
            "success": false,
            "message": self.to_string(),
            "error": self.code(),
            "requestId": request_id,
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(Error::InvalidInput("x".into()).code(), "INVALID_INPUT");
        assert_eq!(Error::QueueUnavailable.code(), "UNAVAILABLE_QUEUE");
        assert_eq!(
            Error::EmbeddingUnavailable("down".into()).code(),
            "UNAVAILABLE_EMBED"
        );
        assert_eq!(Error::Timeout("embed".into()).code(), "TIMEOUT");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::NotFound("j".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::LlmUnavailable("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
