use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use super::provider::MatchFeed;
use crate::db::models::{LiveFixture, MatchObservation, MatchStatus};

pub const DEFAULT_BASE_URL: &str = "https://v3.football.api-sports.io";
pub const DEFAULT_HOST: &str = "v3.football.api-sports.io";

/// Match feed backed by the API-Football v3 REST API.
/// Docs: <https://www.api-football.com/documentation-v3>
pub struct FootballApi {
    http: Client,
    api_key: String,
    host: String,
    /// Base URL for overriding in tests
    base_url: Url,
}

impl FootballApi {
    pub fn new(api_key: &str, host: Option<&str>, base_url: Option<&str>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        let base = base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/');
        Ok(FootballApi {
            http,
            api_key: api_key.to_string(),
            host: host.unwrap_or(DEFAULT_HOST).to_string(),
            base_url: Url::parse(&format!("{}/", base)).context("Invalid API-Football base URL")?,
        })
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path).context("Invalid API-Football path")?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.endpoint(path, query)?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .header("x-apisports-key", &self.api_key)
            .header("x-apisports-host", &self.host)
            .send()
            .await
            .context("API-Football request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("API-Football error {}: {}", status, body);
        }

        resp.json().await.context("Failed to parse API-Football response")
    }
}

#[async_trait]
impl MatchFeed for FootballApi {
    fn name(&self) -> &str {
        "API-Football"
    }

    async fn fetch_match(&self, match_id: &str) -> Result<Option<MatchObservation>> {
        let fixture_raw = self.get("fixtures", &[("id", match_id)]).await?;
        let Some(fixture) = parse_fixture(&fixture_raw) else {
            debug!("No fixture data for match {}", match_id);
            return Ok(None);
        };

        let stats_raw = self.get("fixtures/statistics", &[("fixture", match_id)]).await?;
        let stats = parse_home_statistics(&stats_raw, fixture.home_team_id);
        if stats.is_none() {
            debug!("No statistics for match {}", match_id);
        }

        Ok(Some(observation_from(match_id, fixture, stats.unwrap_or_default())))
    }

    async fn live_fixtures(&self) -> Result<Vec<LiveFixture>> {
        let raw = self.get("fixtures", &[("live", "all")]).await?;
        let fixtures = parse_live_fixtures(&raw);
        info!("Found {} live matches", fixtures.len());
        Ok(fixtures)
    }
}

// ── Response parsing ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct FixtureInfo {
    match_id: String,
    league: String,
    home_team_id: Option<i64>,
    home_team: String,
    away_team: String,
    home_score: u32,
    away_score: u32,
    minute: Option<u32>,
    status: MatchStatus,
}

/// Home-team counters from the statistics endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
struct TeamStats {
    possession: Option<f64>,
    shots: u32,
    shots_on_target: u32,
    corners: u32,
    fouls: u32,
    yellow_cards: u32,
    red_cards: u32,
}

fn fixture_info(item: &Value) -> Option<FixtureInfo> {
    let fixture = &item["fixture"];
    let match_id = match &fixture["id"] {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let home = &item["teams"]["home"];
    let away = &item["teams"]["away"];
    Some(FixtureInfo {
        match_id,
        league: item["league"]["name"].as_str().unwrap_or("unknown").to_string(),
        home_team_id: home["id"].as_i64(),
        home_team: home["name"].as_str()?.to_string(),
        away_team: away["name"].as_str()?.to_string(),
        home_score: as_count(&item["goals"]["home"]),
        away_score: as_count(&item["goals"]["away"]),
        minute: fixture["status"]["elapsed"].as_u64().map(|m| m as u32),
        status: MatchStatus::from_short(fixture["status"]["short"].as_str().unwrap_or("")),
    })
}

fn parse_fixture(raw: &Value) -> Option<FixtureInfo> {
    raw["response"].as_array()?.first().and_then(fixture_info)
}

fn parse_live_fixtures(raw: &Value) -> Vec<LiveFixture> {
    let Some(items) = raw["response"].as_array() else {
        return vec![];
    };
    items
        .iter()
        .filter_map(fixture_info)
        .map(|f| LiveFixture {
            match_id: f.match_id,
            league: f.league,
            home_team: f.home_team,
            away_team: f.away_team,
            home_score: f.home_score,
            away_score: f.away_score,
            minute: f.minute,
            status: f.status,
        })
        .collect()
}

/// Statistics of the home team. Falls back to the first entry when the home
/// team ID is unknown or not listed.
fn parse_home_statistics(raw: &Value, home_team_id: Option<i64>) -> Option<TeamStats> {
    let teams = raw["response"].as_array()?;
    let entry = home_team_id
        .and_then(|id| teams.iter().find(|t| t["team"]["id"].as_i64() == Some(id)))
        .or_else(|| teams.first())?;
    let stats = entry["statistics"].as_array()?;

    let lookup = |name: &str| stat_value(stats, name);

    Some(TeamStats {
        possession: as_percentage(lookup("Ball Possession")),
        shots: as_count(lookup("Total Shots")),
        shots_on_target: as_count(lookup("Shots on Goal")),
        corners: as_count(lookup("Corner Kicks")),
        fouls: as_count(lookup("Fouls")),
        yellow_cards: as_count(lookup("Yellow Cards")),
        red_cards: as_count(lookup("Red Cards")),
    })
}

static NULL: Value = Value::Null;

fn stat_value<'a>(stats: &'a [Value], name: &str) -> &'a Value {
    stats
        .iter()
        .find(|s| s["type"].as_str() == Some(name))
        .map(|s| &s["value"])
        .unwrap_or(&NULL)
}

fn observation_from(match_id: &str, fixture: FixtureInfo, stats: TeamStats) -> MatchObservation {
    MatchObservation {
        match_id: match_id.to_string(),
        timestamp: Utc::now(),
        minute: fixture.minute,
        status: fixture.status,
        home_team: fixture.home_team,
        away_team: fixture.away_team,
        home_score: fixture.home_score,
        away_score: fixture.away_score,
        possession: stats.possession,
        shots: stats.shots,
        shots_on_target: stats.shots_on_target,
        corners: stats.corners,
        fouls: stats.fouls,
        yellow_cards: stats.yellow_cards,
        red_cards: stats.red_cards,
    }
}

/// "55%", "55" or 55 → 55.0; null or garbage → None.
fn as_percentage(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

/// Counters arrive as numbers, numeric strings or null (→ 0).
fn as_count(v: &Value) -> u32 {
    match v {
        Value::Number(n) => n.as_u64().unwrap_or(0) as u32,
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}
