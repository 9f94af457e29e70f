//! # Tally Server
//!
//! Realtime card-board relay. Commands arrive on the submit socket; every
//! resulting event is fanned out to all receive sockets.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! tally
//!
//! # Configure via tally.toml in the working directory, or environment
//! TALLY_PORT=8080 TALLY_HOST=0.0.0.0 tally
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,tally_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;

    tracing::info!("Starting Tally server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}
