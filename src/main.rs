use axum::routing::{get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use doc_ask::api;
use doc_ask::config::Config;
use doc_ask::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Redis: {}", config.redis.url());
    tracing::info!("Embedding service: {}", config.embedding.base_url);
    tracing::info!(
        "Vector store: {} ({})",
        config.vector.base_url,
        config.vector.collection
    );

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/rag/ask", post(api::ask::ask))
        .route("/api/rag/ask-sync", post(api::ask::ask_sync))
        .route("/api/rag/ask-file/{file_id}", post(api::ask::ask_file))
        .route("/api/rag/status/{job_id}", get(api::jobs::status))
        .route("/api/rag/stats", get(api::jobs::stats))
        .route("/api/rag/health", get(api::jobs::health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
