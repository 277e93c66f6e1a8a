// rest_api/src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use clinic_rest_api::config::{load_config, CliArgs};
use clinic_rest_api::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = CliArgs::parse();
    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    info!(
        "Configuration loaded (env: {}, db: {})",
        config.server.env,
        config.storage.path.display()
    );

    start_server(config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl-C, shutting down");
    })
    .await
}
