//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{documents, query, sessions};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Session endpoints
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/:id/history", get(sessions::get_history))
        // Document endpoints
        .route("/sessions/:id/document", post(documents::upload_document))
        .route(
            "/sessions/:id/document/local",
            post(documents::load_local_document),
        )
        // Query endpoints
        .route("/sessions/:id/query", post(query::query_handler))
}
