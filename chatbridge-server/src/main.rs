use anyhow::Context;
use chatbridge_core::{config, Gateway};
use chatbridge_server::AppState;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::load_from_env().context("failed to load configuration")?;
    info!(
        version = chatbridge_core::version(),
        providers_dir = %config.providers_dir.display(),
        "starting chatbridge"
    );

    let gateway = Gateway::new(&config)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    chatbridge_server::serve(listener, AppState::new(gateway)).await?;
    Ok(())
}
