//! abr-meta - Audiobook Request Metadata Resolver
//!
//! Receives indexer webhooks, resolves each request's metadata through
//! MAM (scraped ASIN) → Audnex → Audible search, persists the result and
//! broadcasts it to notification dispatch and the web UI.

use abr_common::config::{load_config, secs_to_duration};
use abr_common::events::EventBus;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use abr_meta::rate_limiter::RateLimiter;
use abr_meta::workflow::{MetadataCoordinator, ResolutionQueue};
use abr_meta::AppState;

/// Audiobook request metadata resolver
#[derive(Debug, Parser)]
#[command(name = "abr-meta", version, about)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, env = "ABR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the bind address from the config file
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG wins over [logging].level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting abr-meta (Metadata Resolver)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = &config.database.path;
    info!("Database: {}", db_path.display());
    let db_pool = abr_meta::db::init_database_pool(db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let rate_limiter = Arc::new(RateLimiter::from_config(&config.rate_limits));
    info!(
        scrape_secs = config.rate_limits.scrape_secs,
        primary_secs = config.rate_limits.primary_secs,
        fallback_secs = config.rate_limits.fallback_secs,
        "Rate limits configured"
    );
    if secs_to_duration(config.rate_limits.scrape_secs).is_zero() {
        warn!("MAM scrape rate limit disabled (scrape_secs = 0)");
    }

    let coordinator = Arc::new(
        MetadataCoordinator::from_config(&config, rate_limiter)
            .context("Failed to build source adapters")?,
    );

    let (queue, worker) = ResolutionQueue::new(Arc::clone(&coordinator), config.queue.capacity);
    tokio::spawn(worker.run());
    info!("Resolution worker running (queue capacity {})", config.queue.capacity);

    let state = AppState::new(db_pool, event_bus, queue, coordinator);
    let app = abr_meta::build_router(state);

    let bind = cli.bind.unwrap_or(config.server.bind);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Webhook endpoint: http://{}/webhook", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
