//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdfqa_core::PdfQaError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API error response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    #[schema(example = "NO_DOCUMENT")]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new("NOT_FOUND", format!("{resource} not found"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
    /// Failure raised by indexing, retrieval or answering
    Service(PdfQaError),
}

/// Status and error code for a domain error
fn classify(err: &PdfQaError) -> (StatusCode, &'static str) {
    match err {
        PdfQaError::Parse(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DOCUMENT_PARSE_ERROR"),
        PdfQaError::Embedding(_) => (StatusCode::BAD_GATEWAY, "EMBEDDING_SERVICE_ERROR"),
        PdfQaError::Index(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INDEX_ERROR"),
        PdfQaError::Llm(_) => (StatusCode::BAD_GATEWAY, "COMPLETION_SERVICE_ERROR"),
        PdfQaError::NoDocumentLoaded => (StatusCode::CONFLICT, "NO_DOCUMENT"),
        PdfQaError::IndexingInProgress => (StatusCode::CONFLICT, "INDEXING_IN_PROGRESS"),
        PdfQaError::Validation(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        PdfQaError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        PdfQaError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
        PdfQaError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ApiError::not_found(&msg)),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ApiError::bad_request(msg)),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::internal_error().with_details(msg),
            ),
            AppError::Service(err) => {
                let (status, code) = classify(&err);
                (status, ApiError::new(code, err.to_string()))
            }
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), code = %error.code, "{}", error.message);
        } else {
            tracing::debug!(status = status.as_u16(), code = %error.code, "{}", error.message);
        }

        (status, Json(error)).into_response()
    }
}

impl From<PdfQaError> for AppError {
    fn from(err: PdfQaError) -> Self {
        match err {
            PdfQaError::NotFound(msg) => AppError::NotFound(msg),
            other => AppError::Service(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PdfQaError::Parse("x".into()), 422, "DOCUMENT_PARSE_ERROR"),
            (PdfQaError::Embedding("x".into()), 502, "EMBEDDING_SERVICE_ERROR"),
            (PdfQaError::Llm("x".into()), 502, "COMPLETION_SERVICE_ERROR"),
            (PdfQaError::NoDocumentLoaded, 409, "NO_DOCUMENT"),
            (PdfQaError::IndexingInProgress, 409, "INDEXING_IN_PROGRESS"),
            (PdfQaError::Validation("x".into()), 400, "BAD_REQUEST"),
        ];

        for (err, status, code) in cases {
            let (s, c) = classify(&err);
            assert_eq!(s.as_u16(), status);
            assert_eq!(c, code);
        }
    }

    #[test]
    fn test_not_found_passthrough() {
        let err: AppError = PdfQaError::NotFound("Session 1".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
