//! ChatMOF - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the assistant API.

use chatmof::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatmof=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: model={}, max_iterations={}, default_key={}",
        config.openai.default_model,
        config.agent.max_iterations,
        config.openai.api_key.is_some()
    );

    api::serve(config).await?;

    Ok(())
}
