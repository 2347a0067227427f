//! Question answering handlers
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
use pdfqa_core::RetrievedChunk;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// User's question
    #[schema(example = "What is the contract term?")]
    pub question: String,
}

/// A retrieved passage the answer was based on
#[derive(Debug, Serialize, ToSchema)]
pub struct SourcePassage {
    /// Similarity rank (1 = closest)
    #[schema(example = 1)]
    pub rank: usize,

    /// Page the passage starts on
    #[schema(example = 2)]
    pub page: u32,

    /// Passage text
    pub content: String,

    /// Similarity score (higher is closer)
    #[schema(example = 0.82)]
    pub score: f32,
}

impl From<RetrievedChunk> for SourcePassage {
    fn from(r: RetrievedChunk) -> Self {
        Self {
            rank: r.rank,
            page: r.chunk.page,
            content: r.chunk.content,
            score: r.score,
        }
    }
}

/// Query response body
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    /// Generated answer
    #[schema(example = "The contract term is two years.")]
    pub answer: String,

    /// Passages given to the model
    pub sources: Vec<SourcePassage>,

    /// Processing time in milliseconds
    #[schema(example = 1250)]
    pub processing_time_ms: u64,
}

/// Ask a question about the session's document
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/query",
    tag = "query",
    params(
        ("id" = Uuid, Path, description = "Session UUID")
    ),
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query successful", body = QueryResponse),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 404, description = "Session not found", body = crate::error::ApiError),
        (status = 409, description = "No document loaded", body = crate::error::ApiError),
        (status = 502, description = "Completion service failed", body = crate::error::ApiError)
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    // Validate request
    if req.question.trim().is_empty() {
        return Err(AppError::BadRequest("Question cannot be empty".to_string()));
    }

    let session = state.session(id).await?;

    // The lock is held only to check the state and to record the exchange
    let pending = session.lock().await.prepare_question(&req.question)?;
    let answer = state
        .qa
        .answer(pending.index(), pending.question())
        .await?;
    session.lock().await.record_answer(&pending, &answer);

    let response = QueryResponse {
        answer: answer.answer,
        sources: answer.sources.into_iter().map(SourcePassage::from).collect(),
        processing_time_ms: answer.processing_time_ms,
    };

    Ok((StatusCode::OK, Json(response)))
}
