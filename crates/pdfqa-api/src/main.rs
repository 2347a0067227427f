//! PDF QA API Server
//!
//! Serves the chat page and REST API for asking questions about a PDF.
//!
//! Author: hephaex@gmail.com

use anyhow::Context;
use pdfqa_api::{create_router, state::AppState};
use pdfqa_core::{AppConfig, LoggingConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("pdfqa_api={0},pdfqa_rag={0},tower_http=info", config.level).into()
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load(None).context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.logging);

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_config(config).context("Failed to initialize services")?);
    tracing::info!(
        model = state.qa.model(),
        local_pdf = %state.config.document.local_pdf_path.display(),
        "Services initialized"
    );

    // Sweep at least once a minute, more often for short timeouts
    let idle_timeout = state.config.server.session_idle_timeout();
    let sweep_every = idle_timeout.clamp(Duration::from_secs(1), Duration::from_secs(60));
    let _sweeper = state.spawn_session_sweeper(sweep_every);

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    state.set_ready(true);
    tracing::info!("PDF QA server starting on http://{}", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C; readiness drops before in-flight requests drain
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    state.set_ready(false);
    tracing::info!("Shutdown signal received, draining requests");
}
