use anyhow::Context;

use ticketqueen_api::{app, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ticketqueen_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        bind_addr = %config.bind_addr,
        persistent = config.is_persistent(),
        seed_demo_events = config.seed_demo_events,
        "starting ticket reservation gateway"
    );

    let app = app::build_app(&config)
        .await
        .context("failed to initialise services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
