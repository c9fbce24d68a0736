//! uptrack - Endpoint Uptime Monitor
//!
//! Continuously probes a set of monitored URLs, records every check, and
//! condenses the history into aligned status timelines.

mod aggregate;
mod config;
mod db;
mod monitor;
mod probe;
mod scheduler;

use config::Config;
use db::Store;
use monitor::Monitor;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("uptrack=info".parse()?))
        .init();

    // Load configuration
    let cfg = Config::load();
    tracing::info!("Starting uptrack...");
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Add sample target if none exist
    let targets = store.get_targets()?;
    if targets.is_empty() {
        tracing::info!("Adding sample target: Google");
        let mut target = db::Target {
            name: "Google".to_string(),
            url: "https://google.com".to_string(),
            ..Default::default()
        };
        store.add_target(&mut target)?;
    }

    // Wire prober, scheduler, and aggregator
    let monitor = Monitor::new(&cfg, store)?;
    monitor.start_scheduler().await;

    // Run until interrupted, then let the current iteration unwind
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");
    monitor.stop_scheduler().await;

    Ok(())
}
