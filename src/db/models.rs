use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{CombinedResult, MatchState};

/// One polled state of a live match, as recorded in its event history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchObservation {
    /// External fixture ID from the score provider
    pub match_id: String,
    pub timestamp: DateTime<Utc>,
    /// Elapsed match minute, when the provider reports one
    pub minute: Option<u32>,
    pub status: MatchStatus,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    /// Home-side ball possession in percent (0–100)
    pub possession: Option<f64>,
    pub shots: u32,
    pub shots_on_target: u32,
    pub corners: u32,
    pub fouls: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
}

impl MatchObservation {
    pub fn total_goals(&self) -> u32 {
        self.home_score + self.away_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    NotStarted,
    InProgress,
    HalfTime,
    Finished,
    /// Suspended, interrupted, postponed or abandoned
    Interrupted,
}

impl MatchStatus {
    /// Map an API-Football short status code ("1H", "HT", "FT", ...).
    pub fn from_short(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "TBD" | "NS" => MatchStatus::NotStarted,
            "1H" | "2H" | "ET" | "BT" | "P" | "LIVE" => MatchStatus::InProgress,
            "HT" => MatchStatus::HalfTime,
            "FT" | "AET" | "PEN" | "AWD" | "WO" => MatchStatus::Finished,
            "SUSP" | "INT" | "PST" | "CANC" | "ABD" => MatchStatus::Interrupted,
            _ => MatchStatus::InProgress,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::InProgress | MatchStatus::HalfTime)
    }
}

/// Latest analysis of one match; persisted and pushed to WebSocket clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchSnapshot {
    pub match_id: String,
    pub home_team: String,
    pub away_team: String,
    pub timestamp: DateTime<Utc>,
    pub minute: Option<u32>,
    pub status: MatchStatus,
    pub home_score: u32,
    pub away_score: u32,
    pub match_state: MatchState,
    /// Observations the analysis was computed from
    pub sample_size: usize,
    pub analysis: CombinedResult,
}

/// A fixture currently in play, as listed by provider discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveFixture {
    pub match_id: String,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub minute: Option<u32>,
    pub status: MatchStatus,
}
