//! Document loading handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::handlers::sessions::DocumentResponse;
use crate::state::{AppState, SharedSession};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use base64::Engine;
use futures::FutureExt;
use pdfqa_core::PdfQaError;
use pdfqa_rag::DocumentSource;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Upload document request
#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadDocumentRequest {
    /// Original file name
    #[schema(example = "contract.pdf")]
    pub filename: String,

    /// Base64 encoded PDF bytes
    pub content: String,
}

/// Document load response
#[derive(Debug, Serialize, ToSchema)]
pub struct LoadDocumentResponse {
    pub session_id: Uuid,
    pub document: DocumentResponse,
    pub message: String,
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("indexing panicked")
}

/// Index a document and make it the session's active document
///
/// The session is locked only to enter and leave the indexing state, so
/// its state stays readable while the document is processed. The work
/// runs in its own task and completes even if the client disconnects.
/// Every path out of the task leaves the indexing state.
async fn load_into_session(
    state: &Arc<AppState>,
    id: Uuid,
    session: SharedSession,
    source: DocumentSource,
) -> Result<LoadDocumentResponse, AppError> {
    session.lock().await.begin_indexing()?;

    let indexer = Arc::clone(&state.indexer);
    let task_session = Arc::clone(&session);
    let task = tokio::spawn(async move {
        let result = AssertUnwindSafe(indexer.index(source))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(PdfQaError::Index(format!(
                    "Indexing aborted: {}",
                    panic_reason(&*panic)
                )))
            });
        task_session.lock().await.finish_indexing(result)
    });

    let info = match task.await {
        Ok(result) => result?,
        Err(e) => {
            tracing::error!(session = %id, error = %e, "Indexing task did not complete");
            let failure = PdfQaError::Index(format!("Indexing task failed: {e}"));
            session.lock().await.finish_indexing(Err(failure))?
        }
    };

    Ok(LoadDocumentResponse {
        session_id: id,
        message: format!(
            "Indexed {} pages into {} windows",
            info.page_count, info.chunk_count
        ),
        document: DocumentResponse::from(&info),
    })
}

/// Upload a PDF and index it
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/document",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Session UUID")
    ),
    request_body = UploadDocumentRequest,
    responses(
        (status = 201, description = "Document indexed", body = LoadDocumentResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 409, description = "Indexing already in progress", body = crate::error::ApiError),
        (status = 422, description = "PDF could not be read", body = crate::error::ApiError),
        (status = 502, description = "Embedding service failed", body = crate::error::ApiError)
    )
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    // Validate request
    if req.filename.trim().is_empty() {
        return Err(AppError::BadRequest("Filename cannot be empty".to_string()));
    }

    if req.content.is_empty() {
        return Err(AppError::BadRequest("Content cannot be empty".to_string()));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(req.content.trim())
        .map_err(|e| AppError::BadRequest(format!("Content is not valid base64: {e}")))?;

    let session = state.session(id).await?;

    tracing::info!(
        session = %id,
        filename = %req.filename,
        bytes = bytes.len(),
        "Document upload received"
    );

    let source = DocumentSource::Bytes {
        name: req.filename.trim().to_string(),
        bytes,
    };
    let response = load_into_session(&state, id, session, source).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Index the configured local PDF
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/document/local",
    tag = "documents",
    params(
        ("id" = Uuid, Path, description = "Session UUID")
    ),
    responses(
        (status = 201, description = "Document indexed", body = LoadDocumentResponse),
        (status = 404, description = "Session not found", body = crate::error::ApiError),
        (status = 409, description = "Indexing already in progress", body = crate::error::ApiError),
        (status = 422, description = "PDF could not be read", body = crate::error::ApiError)
    )
)]
pub async fn load_local_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let session = state.session(id).await?;
    let path = state.config.document.local_pdf_path.clone();

    tracing::info!(session = %id, path = %path.display(), "Loading local document");

    let response = load_into_session(&state, id, session, DocumentSource::Path(path)).await?;

    Ok((StatusCode::CREATED, Json(response)))
}
