use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

mod analytics;
mod config;
mod dashboard;
mod db;
mod live_scores;
mod tracker;

use analytics::AbcPipeline;
use config::Config;
use dashboard::AppState;
use db::Database;
use live_scores::{FootballApi, MatchFeed};
use tracker::{MatchRegistry, SnapshotContext};

/// Buffered snapshots per WebSocket subscriber before it starts lagging.
const SNAPSHOT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let api_key = config.football_api_key.as_deref().unwrap_or_default();
    let feed: Arc<dyn MatchFeed> = Arc::new(FootballApi::new(
        api_key,
        Some(&config.football_api_host),
        Some(&config.football_api_url),
    )?);

    // Tracked matches: command line first, then the last persisted selection
    let registry = MatchRegistry::new();
    let mut selection = config.initial_matches();
    if selection.is_empty() {
        selection = db.active_matches()?;
    }
    if !selection.is_empty() {
        registry.select(&selection);
        db.save_active_matches(&selection)?;
        info!("Tracking {} matches: {:?}", selection.len(), selection);
    } else if !config.auto_discover {
        warn!("No matches selected; use --matches, --auto-discover or POST /api/start-analysis");
    }

    let params = config.analysis_params();
    info!(
        "Model: HOLT({},{}), {} simulations, recalibration above volatility {}",
        params.trend.alpha,
        params.trend.beta,
        params.simulation.simulations,
        params.pipeline.recalibration_volatility
    );
    let (snapshots, _) = broadcast::channel(SNAPSHOT_CHANNEL_CAPACITY);

    live_scores::start_ingestion(Arc::clone(&feed), registry.clone(), config.poll_interval());
    if config.auto_discover {
        live_scores::start_discovery(
            Arc::clone(&feed),
            registry.clone(),
            db.clone(),
            config.discovery_interval(),
        );
    }
    tracker::start_snapshot_loop(
        SnapshotContext {
            pipeline: Arc::new(AbcPipeline::new(params)),
            registry: registry.clone(),
            db: db.clone(),
            updates: snapshots.clone(),
            match_minutes: config.match_minutes,
        },
        config.snapshot_interval(),
    );

    let app = dashboard::router(AppState {
        db,
        registry,
        snapshots,
        feed,
    });
    let addr: SocketAddr = config.dashboard_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Dashboard listening on http://{}", addr);

    // Run dashboard server until Ctrl-C
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
        })
        .await?;

    Ok(())
}
