use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod feeds;
mod model;
mod search;
mod seed;
mod state;
mod telemetry;
mod views;

use config::Config;
use seed::Fleet;
use state::FleetStore;
use views::Session;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    // 1. Build the fleet from the seed dataset
    let fleet = Fleet::seeded().context("Seed dataset is invalid")?;
    let settings = config.feed_settings(&fleet);
    info!(
        stops = fleet.stops.len(),
        buses = fleet.buses.len(),
        corridor = ?settings.walk.corridor,
        "Fleet loaded"
    );

    // 2. Session owns the store and its feeds
    let store = Arc::new(FleetStore::new(fleet));
    let session = Arc::new(Session::new(store, settings).context("Cannot start session")?);

    // 3. HTTP Server
    let routes = api::routes(session.clone());
    let (addr, server) = warp::serve(routes)
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], config.port), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!("Server running at http://localhost:{}", addr.port());

    server.await;

    // 4. No tick may outlive the session
    info!(feeds = session.feeds().active_count(), "Stopping feeds");
    session.close().await;
    info!("Shut down");
    Ok(())
}
