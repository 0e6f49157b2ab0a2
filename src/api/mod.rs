//! HTTP API module.
//!
//! Provides endpoints for:
//! - Asking a question (whole run or streamed as SSE)
//! - Listing example questions, enabled tools and property models
//! - Health checks

mod routes;
mod session;
mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;

pub use routes::AppState;
pub use session::{
    run_session, LlmProvider, OpenAiProvider, SessionOutcome, SessionRequest, EMPTY_QUESTION,
    MISSING_KEY,
};
pub use types::*;

/// Build the router over prepared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/questions", get(routes::questions))
        .route("/api/models", get(routes::models))
        .route("/api/tools", get(routes::tools))
        .route("/api/ask", post(routes::ask))
        .route("/api/ask/stream", post(routes::ask_stream))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let provider = Arc::new(OpenAiProvider::new(config.openai.clone()));
    let state = Arc::new(AppState::new(config, provider));

    tracing::info!(
        tools = state.resources.settings.enabled.len(),
        rows = state.resources.table.len(),
        "Application state ready"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, router(state)).await?;

    Ok(())
}
