//! The integrated trend → momentum → outcome pipeline.
//!
//! 1. The goal trend and its structural breaks are extracted.
//! 2. Momentum is estimated from possession with a trend-informed prior.
//! 3. The momentum drift drives the Monte Carlo outcome simulation.
//! 4. A structural break or high momentum volatility requests
//!    recalibration, and both stage confidences are folded into one score.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::momentum::{MomentumEstimate, MomentumEstimator};
use super::params::{AnalysisParams, PipelineParams};
use super::simulation::{OutcomeDistribution, OutcomeSimulator};
use super::trend::{GoalForecast, TrendExtractor, TrendSignal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub trend_signal: TrendSignal,
    pub goal_forecast: GoalForecast,
    pub momentum: MomentumEstimate,
    pub outcome: OutcomeDistribution,
    pub needs_recalibration: bool,
    pub integration_confidence: f64,
}

/// Who is on top, read off the momentum drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchState {
    HomeDominating,
    HomeSlightAdvantage,
    Balanced,
    AwaySlightAdvantage,
    AwayDominating,
}

impl MatchState {
    pub fn from_drift(drift: f64) -> Self {
        if drift > 0.10 {
            MatchState::HomeDominating
        } else if drift > 0.03 {
            MatchState::HomeSlightAdvantage
        } else if drift < -0.10 {
            MatchState::AwayDominating
        } else if drift < -0.03 {
            MatchState::AwaySlightAdvantage
        } else {
            MatchState::Balanced
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchState::HomeDominating => "HOME_DOMINATING",
            MatchState::HomeSlightAdvantage => "HOME_SLIGHT_ADVANTAGE",
            MatchState::Balanced => "BALANCED",
            MatchState::AwaySlightAdvantage => "AWAY_SLIGHT_ADVANTAGE",
            MatchState::AwayDominating => "AWAY_DOMINATING",
        };
        f.write_str(s)
    }
}

/// Stateless orchestrator; one instance is shared by every match task.
#[derive(Debug, Clone, Default)]
pub struct AbcPipeline {
    trend: TrendExtractor,
    momentum: MomentumEstimator,
    simulator: OutcomeSimulator,
    params: PipelineParams,
}

impl AbcPipeline {
    pub fn new(params: AnalysisParams) -> Self {
        AbcPipeline {
            trend: TrendExtractor::new(params.trend),
            momentum: MomentumEstimator::new(params.momentum),
            simulator: OutcomeSimulator::new(params.simulation),
            params: params.pipeline,
        }
    }

    /// Shortest goal history worth analysing; below it the trend stage can
    /// only return its neutral signal.
    pub fn min_observations(&self) -> usize {
        self.trend.params().min_samples
    }

    /// Run all stages in order. Always returns a structurally valid result;
    /// stages that cannot compute fall back to their neutral values.
    pub fn analyze(
        &self,
        possession: &[f64],
        goals: &[f64],
        home_score: u32,
        away_score: u32,
        minutes_remaining: u32,
    ) -> CombinedResult {
        let trend_signal = self.trend.extract_signal(goals);
        let goal_forecast = self.trend.forecast_default(goals);
        info!(
            "Trend: {:.5} goals/step, break={}, confidence={:.3}",
            trend_signal.trend, trend_signal.structural_break_detected, trend_signal.confidence
        );

        let prior = self.momentum.informed_prior(&trend_signal);
        let momentum = self.momentum.estimate_from_possession(possession, &prior);
        info!(
            "Momentum: drift={:.5}, volatility={:.5}, prior mean={:.5}",
            momentum.drift, momentum.volatility, prior.mean
        );

        let outcome = self.simulator.simulate_default(
            home_score,
            away_score,
            momentum.drift,
            momentum.volatility,
            minutes_remaining,
        );
        info!(
            "Monte Carlo ({} runs): P(home)={:.3}, P(draw)={:.3}, P(away)={:.3}",
            self.simulator.params().simulations,
            outcome.probability_home_win, outcome.probability_draw, outcome.probability_away_win
        );

        let high_volatility = momentum.volatility > self.params.recalibration_volatility;
        let needs_recalibration = trend_signal.structural_break_detected || high_volatility;
        if needs_recalibration {
            warn!(
                "Recalibration recommended (structural break={}, high volatility={})",
                trend_signal.structural_break_detected, high_volatility
            );
        }

        let integration_confidence = integration_confidence(
            trend_signal.confidence,
            momentum.confidence,
            trend_signal.structural_break_detected,
            self.params.break_stability_factor,
        );

        CombinedResult {
            trend_signal,
            goal_forecast,
            momentum,
            outcome,
            needs_recalibration,
            integration_confidence,
        }
    }
}

/// Geometric mean of the stage confidences, discounted after a break.
pub fn integration_confidence(
    trend_confidence: f64,
    momentum_confidence: f64,
    structural_break: bool,
    break_stability_factor: f64,
) -> f64 {
    let stability = if structural_break { break_stability_factor } else { 1.0 };
    (trend_confidence * momentum_confidence).max(0.0).sqrt() * stability
}
