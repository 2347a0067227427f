//! Browser chat page
//!
//! Author: hephaex@gmail.com

use axum::response::{Html, IntoResponse};

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Serve the single-page chat UI
pub async fn index_page() -> impl IntoResponse {
    Html(INDEX_HTML)
}
