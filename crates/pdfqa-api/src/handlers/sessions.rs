//! Session handlers
//!
//! A session is one browser tab's conversation: at most one loaded
//! document and the history of questions asked against it.
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use pdfqa_core::{DocumentInfo, QaRecord};
use pdfqa_rag::{QaSession, SessionPhase};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No document loaded yet
    Empty,
    /// A document is being indexed
    Indexing,
    /// Questions can be asked
    Ready,
}

impl From<SessionPhase> for SessionStatus {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Empty => Self::Empty,
            SessionPhase::Indexing => Self::Indexing,
            SessionPhase::Ready => Self::Ready,
        }
    }
}

/// Loaded document summary
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    /// Document UUID (new for every load)
    pub id: Uuid,

    /// File name
    #[schema(example = "contract.pdf")]
    pub name: String,

    /// Extracted pages
    #[schema(example = 3)]
    pub page_count: u32,

    /// Indexed windows
    #[schema(example = 3)]
    pub chunk_count: usize,

    /// Extracted characters
    #[schema(example = 2500)]
    pub char_count: usize,

    /// When indexing finished
    pub indexed_at: DateTime<Utc>,
}

impl From<&DocumentInfo> for DocumentResponse {
    fn from(info: &DocumentInfo) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            page_count: info.page_count,
            chunk_count: info.chunk_count,
            char_count: info.char_count,
            indexed_at: info.indexed_at,
        }
    }
}

/// Session summary
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    /// Session UUID
    pub id: Uuid,

    /// Lifecycle state
    pub state: SessionStatus,

    /// Document questions are answered from
    pub document: Option<DocumentResponse>,

    /// Number of exchanges with the current document
    pub history_length: usize,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl From<&QaSession> for SessionResponse {
    fn from(session: &QaSession) -> Self {
        Self {
            id: session.id(),
            state: session.phase().into(),
            document: session.document().map(DocumentResponse::from),
            history_length: session.history().len(),
            created_at: session.created_at(),
        }
    }
}

/// One question/answer exchange
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntry {
    #[schema(example = "What is the contract term?")]
    pub question: String,
    pub answer: String,
    pub asked_at: DateTime<Utc>,
}

impl From<&QaRecord> for HistoryEntry {
    fn from(record: &QaRecord) -> Self {
        Self {
            question: record.question.clone(),
            answer: record.answer.clone(),
            asked_at: record.asked_at,
        }
    }
}

/// Chat history response
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub session_id: Uuid,

    /// Name of the document the history belongs to
    pub document: Option<String>,

    /// Exchanges, oldest first
    pub entries: Vec<HistoryEntry>,
}

/// Create a new session
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "sessions",
    responses(
        (status = 201, description = "Session created", body = SessionResponse)
    )
)]
pub async fn create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.increment_requests();

    let (_, session) = state.create_session().await;
    let response = SessionResponse::from(&*session.lock().await);

    (StatusCode::CREATED, Json(response))
}

/// Get session state
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session UUID")
    ),
    responses(
        (status = 200, description = "Session details", body = SessionResponse),
        (status = 404, description = "Session not found", body = crate::error::ApiError)
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let session = state.session(id).await?;
    let response = SessionResponse::from(&*session.lock().await);

    Ok((StatusCode::OK, Json(response)))
}

/// Delete session response
#[derive(Debug, Serialize, ToSchema)]
pub struct DeleteSessionResponse {
    pub message: String,
}

/// Discard a session with its document and history
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{id}",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session UUID")
    ),
    responses(
        (status = 200, description = "Session deleted", body = DeleteSessionResponse),
        (status = 404, description = "Session not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    if !state.remove_session(id).await {
        return Err(AppError::NotFound(format!("Session {id}")));
    }

    Ok((
        StatusCode::OK,
        Json(DeleteSessionResponse {
            message: format!("Session {id} deleted"),
        }),
    ))
}

/// Get the chat history of the current document
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/history",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session UUID")
    ),
    responses(
        (status = 200, description = "Chat history", body = HistoryResponse),
        (status = 404, description = "Session not found", body = crate::error::ApiError)
    )
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let session = state.session(id).await?;
    let session = session.lock().await;

    let response = HistoryResponse {
        session_id: id,
        document: session.document().map(|d| d.name.clone()),
        entries: session.history().iter().map(HistoryEntry::from).collect(),
    };

    Ok((StatusCode::OK, Json(response)))
}
