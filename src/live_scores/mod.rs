pub mod football_api;
pub mod provider;

pub use football_api::FootballApi;
pub use provider::MatchFeed;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::tracker::MatchRegistry;

/// Fetch every tracked match concurrently and record the observations.
/// Returns how many observations were recorded.
pub async fn poll_once(feed: &Arc<dyn MatchFeed>, registry: &MatchRegistry, timeout: Duration) -> usize {
    let ids = registry.tracked_ids();
    if ids.is_empty() {
        return 0;
    }

    let fetches: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let feed = Arc::clone(feed);
            async move {
                let res = tokio::time::timeout(timeout, feed.fetch_match(&id)).await;
                let out = match res {
                    Ok(result) => result,
                    Err(_) => Err(anyhow::anyhow!("timed out after {:?}", timeout)),
                };
                (id, out)
            }
        })
        .collect();

    let mut recorded = 0;
    for (id, result) in futures_util::future::join_all(fetches).await {
        match result {
            Ok(Some(observation)) => {
                debug!(
                    "Match {}: {} {}-{} {} (minute {:?}, possession {:?})",
                    id,
                    observation.home_team,
                    observation.home_score,
                    observation.away_score,
                    observation.away_team,
                    observation.minute,
                    observation.possession
                );
                if registry.record(observation) {
                    recorded += 1;
                }
            }
            Ok(None) => warn!("{}: no data for match {}", feed.name(), id),
            Err(e) => warn!("{}: fetching match {} failed: {:#}", feed.name(), id, e),
        }
    }
    recorded
}

/// Spawns the ingestion loop polling the feed for every tracked match.
pub fn start_ingestion(feed: Arc<dyn MatchFeed>, registry: MatchRegistry, poll_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Ingestion started ({}, interval={:?})", feed.name(), poll_interval);
        let request_timeout = poll_interval.min(Duration::from_secs(10));
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let n = poll_once(&feed, &registry, request_timeout).await;
            debug!("Ingestion tick: {} observations recorded", n);
        }
    })
}

/// Replace the tracked set with the feed's live fixtures and persist it.
/// Returns the number of matches now tracked.
pub async fn discover_once(feed: &Arc<dyn MatchFeed>, registry: &MatchRegistry, db: &Database) -> anyhow::Result<usize> {
    let fixtures = feed.live_fixtures().await?;
    let ids: Vec<String> = fixtures
        .into_iter()
        .filter(|f| f.status.is_live())
        .map(|f| f.match_id)
        .collect();
    let tracked = registry.select(&ids);
    db.save_active_matches(&ids)?;
    Ok(tracked)
}

/// Spawns periodic auto-discovery of live fixtures.
pub fn start_discovery(
    feed: Arc<dyn MatchFeed>,
    registry: MatchRegistry,
    db: Database,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Auto-discovery started (interval={:?})", every);
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match discover_once(&feed, &registry, &db).await {
                Ok(n) => info!("Auto-discovery: tracking {} live matches", n),
                Err(e) => error!("Auto-discovery failed: {:#}", e),
            }
        }
    })
}
