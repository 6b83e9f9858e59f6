//! Binary entrypoint for the textsum API server.
use anyhow::Context;
use textsum_api::{run, AppState};
use textsum_config::ConfigurationManager;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Default listen address can be overridden with TEXTSUM_ADDR
    let addr = std::env::var("TEXTSUM_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let manager = ConfigurationManager::from_env().context("loading configuration")?;
    let state = AppState::new(manager).context("building metrics registry")?;

    run(&addr, state).await.with_context(|| format!("serving on {addr}"))
}
