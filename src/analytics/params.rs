//! Tunable constants of the analysis pipeline.
//!
//! Every literal the models depend on lives here so it can be overridden
//! from the command line (see [`crate::config::Config::analysis_params`])
//! without touching the formulas.

use serde::{Deserialize, Serialize};

/// Average goals per minute in top-flight football (~2.7 per 90 minutes).
pub const BASE_GOAL_RATE: f64 = 0.03;

/// Double exponential smoothing, forecasting and break detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendParams {
    /// Level smoothing constant (α).
    pub alpha: f64,
    /// Trend smoothing constant (β).
    pub beta: f64,
    /// Reference goal rate used to express the trend as a percentage.
    pub base_goal_rate: f64,
    /// CUSUM alarm threshold in standard deviations.
    pub cusum_threshold_sigmas: f64,
    /// Trailing fraction of the series scanned for structural breaks.
    pub break_window_fraction: f64,
    /// z-score of the forecast confidence interval (1.96 → 95%).
    pub forecast_z: f64,
    /// Default number of steps ahead to forecast.
    pub forecast_horizon: usize,
    /// Minimum number of observations before any trend is computed.
    pub min_samples: usize,
    /// |trend %| below which the attack is described as stable.
    pub stable_band_pct: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.1,
            base_goal_rate: BASE_GOAL_RATE,
            cusum_threshold_sigmas: 3.0,
            break_window_fraction: 0.3,
            forecast_z: 1.96,
            forecast_horizon: 10,
            min_samples: 10,
            stable_band_pct: 5.0,
        }
    }
}

/// Conjugate-normal momentum model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MomentumParams {
    /// Variance of the uninformed prior; also the base of the informed one.
    pub prior_variance: f64,
    /// Rescales a goals/minute trend onto the possession-change scale.
    pub trend_to_possession_scale: f64,
    /// Confidence multiplier applied when the trend signal saw a break.
    pub break_confidence_penalty: f64,
    /// Minimum raw possession observations (one change needs two).
    pub min_observations: usize,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            prior_variance: 0.01,
            trend_to_possession_scale: 10.0,
            break_confidence_penalty: 0.7,
            min_observations: 2,
        }
    }
}

/// Monte Carlo outcome simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    pub base_goal_rate: f64,
    /// Number of simulated match endings per run.
    pub simulations: usize,
    /// Fixed RNG seed. `None` draws a fresh seed from the OS on every run.
    pub seed: Option<u64>,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            base_goal_rate: BASE_GOAL_RATE,
            simulations: 10_000,
            seed: None,
        }
    }
}

/// Orchestrator thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
    /// Momentum volatility strictly above this requests recalibration.
    pub recalibration_volatility: f64,
    /// Multiplier on the integration confidence after a structural break.
    pub break_stability_factor: f64,
}

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            recalibration_volatility: 0.15,
            break_stability_factor: 0.7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub trend: TrendParams,
    pub momentum: MomentumParams,
    pub simulation: SimulationParams,
    pub pipeline: PipelineParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let p = AnalysisParams::default();
        assert_eq!(p.trend.alpha, 0.3);
        assert_eq!(p.trend.beta, 0.1);
        assert_eq!(p.trend.min_samples, 10);
        assert_eq!(p.momentum.min_observations, 2);
        assert_eq!(p.simulation.simulations, 10_000);
        assert_eq!(p.pipeline.recalibration_volatility, 0.15);
        assert_eq!(p.trend.base_goal_rate, p.simulation.base_goal_rate);
    }
}
