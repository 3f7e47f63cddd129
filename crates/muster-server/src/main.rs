//! Muster daemon: application entry point.
//!
//! Connects to SurrealDB, applies migrations, builds the lifecycle
//! controller and keeps the active and departed rosters in sync with the
//! member change feed until interrupted.

mod config;
mod daemon;
mod error;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::daemon::Daemon;
use crate::error::ServerError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("muster=info")),
        )
        .json()
        .init();

    info!("Starting muster daemon...");

    if let Err(e) = run().await {
        error!(error = %e, "Muster daemon failed");
        std::process::exit(1);
    }

    info!("Muster daemon stopped.");
}

async fn run() -> Result<(), ServerError> {
    let config = ServerConfig::load()?;
    let daemon = Daemon::start(&config).await?;

    tokio::signal::ctrl_c().await.map_err(ServerError::Signal)?;
    info!("Shutdown requested");

    daemon.shutdown();
    Ok(())
}
