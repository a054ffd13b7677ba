use anyhow::Context;
use tokio::net::TcpListener;

use newswire_backend::core::config::{AppConfig, AppPaths};
use newswire_backend::core::logging;
use newswire_backend::server::router::router;
use newswire_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = AppPaths::new();
    logging::init(&paths);

    let config = AppConfig::from_env()?;
    let state = AppState::initialize(config, &paths).await?;

    // One ingestion + embedding pass in the background; the service starts
    // even if it fails.
    let bootstrap = state.clone();
    tokio::spawn(async move {
        bootstrap.bootstrap_index().await;
    });

    let bind_addr = format!("0.0.0.0:{}", state.config.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    let app = router(state);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
