use tracing_subscriber::EnvFilter;

use doc_ask::config::Config;
use doc_ask::state::AppState;
use doc_ask::worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!(
        "Worker {} ({}) polling every {} ms",
        config.worker.worker_id,
        config.worker.worker_type,
        config.worker.poll_interval_ms
    );

    let state = AppState::new(config)?;
    worker::run_until_shutdown(state).await
}
