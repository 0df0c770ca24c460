use anyhow::Result;
use async_trait::async_trait;

use crate::db::models::{LiveFixture, MatchObservation};

/// Trait that every live match data source must implement.
#[async_trait]
pub trait MatchFeed: Send + Sync {
    /// Current state of one fixture, or `None` if the provider has no data for it.
    async fn fetch_match(&self, match_id: &str) -> Result<Option<MatchObservation>>;

    /// All fixtures the provider currently reports as live.
    async fn live_fixtures(&self) -> Result<Vec<LiveFixture>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
