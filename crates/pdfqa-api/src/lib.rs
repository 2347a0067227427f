//! PDF QA API - HTTP server
//!
//! Serves the browser chat page and the JSON endpoints behind it:
//! sessions, document loading, questions and chat history.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use crate::handlers::{documents, health, query, sessions, ui};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use pdfqa_core::ServerConfig;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    info(
        title = "PDF QA API",
        description = "Ask questions about an uploaded PDF document"
    ),
    paths(
        health::health_check,
        health::readiness_check,
        health::metrics,
        sessions::create_session,
        sessions::get_session,
        sessions::delete_session,
        sessions::get_history,
        documents::upload_document,
        documents::load_local_document,
        query::query_handler,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::MetricsResponse,
        sessions::SessionStatus,
        sessions::SessionResponse,
        sessions::DocumentResponse,
        sessions::DeleteSessionResponse,
        sessions::HistoryEntry,
        sessions::HistoryResponse,
        documents::UploadDocumentRequest,
        documents::LoadDocumentResponse,
        query::QueryRequest,
        query::QueryResponse,
        query::SourcePassage,
    )),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "sessions", description = "Chat sessions and history"),
        (name = "documents", description = "Loading the document to ask about"),
        (name = "query", description = "Question answering")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_body_size;

    let mut router = Router::new()
        .route("/", get(ui::index_page))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1", routes::api_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http());

    if state.config.server.cors_enabled {
        router = router.layer(cors_layer(&state.config.server));
    }

    router.with_state(state)
}
