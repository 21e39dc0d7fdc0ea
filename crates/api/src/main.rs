use anyhow::Context;
use tokio::net::TcpListener;

use huachuca_api::{app::services, build_app, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    huachuca_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let state = services::build_state(&config).await?;

    // Stops when dropped at the end of `main`.
    let _sweeper = state
        .oauth_states
        .spawn_sweeper(config.oauth_sweep_interval);

    let app = build_app(state);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
