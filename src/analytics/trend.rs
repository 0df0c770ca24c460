//! Goal-trend extraction.
//!
//! A restricted Holt model (double exponential smoothing) over the
//! cumulative-goals series gives a per-observation trend and a short
//! forecast. A one-sided CUSUM over the trailing window flags structural
//! breaks, i.e. moments where the scoring regime changed abruptly (red card,
//! tactical switch, a burst of goals).

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::{ensure_finite, or_neutral, AnalysisError, AnalysisResult};
use super::params::TrendParams;
use super::stats;

/// Free parameters of the smoothing model: level, trend, noise.
const MODEL_PARAMS: usize = 3;

/// Bounds applied to the next-goal probability.
const NEXT_GOAL_PROB_MIN: f64 = 0.05;
const NEXT_GOAL_PROB_MAX: f64 = 0.95;
/// Trend floor used when turning a rate into an expected wait.
const MIN_GOAL_RATE: f64 = 0.01;

/// Trend summary handed to the momentum stage and shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSignal {
    /// Smoothed goals per observation step (signed).
    pub trend: f64,
    /// `trend` relative to the base goal rate, in percent.
    pub trend_percentage: f64,
    pub structural_break_detected: bool,
    /// |mean(after split) − mean(before split)|, 0 when no break.
    pub break_magnitude: f64,
    pub confidence: f64,
    /// Sample standard deviation of the input series.
    pub volatility: f64,
    pub description: String,
}

impl TrendSignal {
    pub fn insufficient() -> Self {
        TrendSignal {
            trend: 0.0,
            trend_percentage: 0.0,
            structural_break_detected: false,
            break_magnitude: 0.0,
            confidence: 0.0,
            volatility: 0.0,
            description: "Insufficient data".to_string(),
        }
    }
}

/// Multi-step forecast of cumulative goals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalForecast {
    pub model_order: String,
    pub horizon: usize,
    pub predictions: Vec<f64>,
    pub confidence_interval_lower: Vec<f64>,
    pub confidence_interval_upper: Vec<f64>,
    pub next_goal_probability: f64,
    /// Expected observation steps until the next goal.
    pub next_goal_minute: u32,
    /// Akaike information criterion. `None` is the worst-possible sentinel
    /// (zero variance or too few points to fit three parameters).
    pub aic: Option<f64>,
    pub confidence: f64,
}

impl GoalForecast {
    pub fn neutral(horizon: usize) -> Self {
        GoalForecast {
            model_order: "NONE".to_string(),
            horizon,
            predictions: vec![0.0; horizon],
            confidence_interval_lower: vec![0.0; horizon],
            confidence_interval_upper: vec![0.0; horizon],
            next_goal_probability: 0.0,
            next_goal_minute: 0,
            aic: None,
            confidence: 0.0,
        }
    }
}

/// Final smoothed state after one pass over the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoltState {
    pub level: f64,
    pub trend: f64,
}

#[derive(Debug, Clone)]
pub struct TrendExtractor {
    params: TrendParams,
}

impl Default for TrendExtractor {
    fn default() -> Self {
        Self::new(TrendParams::default())
    }
}

impl TrendExtractor {
    pub fn new(params: TrendParams) -> Self {
        TrendExtractor { params }
    }

    pub fn params(&self) -> &TrendParams {
        &self.params
    }

    /// Forecast `horizon` steps ahead; neutral forecast on short or bad input.
    pub fn forecast(&self, series: &[f64], horizon: usize) -> GoalForecast {
        or_neutral("goal forecast", self.try_forecast(series, horizon), || {
            GoalForecast::neutral(horizon)
        })
    }

    /// Forecast with the configured default horizon.
    pub fn forecast_default(&self, series: &[f64]) -> GoalForecast {
        self.forecast(series, self.params.forecast_horizon)
    }

    /// Trend signal; neutral "Insufficient data" signal on short or bad input.
    pub fn extract_signal(&self, series: &[f64]) -> TrendSignal {
        or_neutral("trend signal", self.try_extract_signal(series), TrendSignal::insufficient)
    }

    pub fn try_forecast(&self, series: &[f64], horizon: usize) -> AnalysisResult<GoalForecast> {
        self.check_series(series)?;

        let state = self.smooth(series);
        let std_error = stats::std_dev(series);

        let mut predictions = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for h in 1..=horizon {
            let h = h as f64;
            let point = state.level + h * state.trend;
            let margin = self.params.forecast_z * std_error * h.sqrt();
            predictions.push(point);
            lower.push((point - margin).max(0.0));
            upper.push(point + margin);
        }

        let next_goal_probability =
            (state.trend * horizon as f64).clamp(NEXT_GOAL_PROB_MIN, NEXT_GOAL_PROB_MAX);
        let next_goal_minute = (1.0 / state.trend.max(MIN_GOAL_RATE)).round() as u32;

        Ok(GoalForecast {
            model_order: format!("HOLT({},{})", self.params.alpha, self.params.beta),
            horizon,
            predictions,
            confidence_interval_lower: lower,
            confidence_interval_upper: upper,
            next_goal_probability,
            next_goal_minute,
            aic: aic(series, MODEL_PARAMS),
            confidence: sample_confidence(series.len()),
        })
    }

    pub fn try_extract_signal(&self, series: &[f64]) -> AnalysisResult<TrendSignal> {
        self.check_series(series)?;

        let state = self.smooth(series);
        let break_at = self.detect_structural_break(series);
        let structural_break_detected = break_at.is_some();
        let break_magnitude = if structural_break_detected {
            self.break_magnitude(series)
        } else {
            0.0
        };

        let trend_percentage = state.trend / self.params.base_goal_rate * 100.0;
        if !trend_percentage.is_finite() {
            return Err(AnalysisError::Unexpected(format!(
                "trend percentage is {} (base rate {})",
                trend_percentage, self.params.base_goal_rate
            )));
        }
        let description = self.describe(trend_percentage, structural_break_detected);
        debug!("Trend signal: {}", description);

        Ok(TrendSignal {
            trend: state.trend,
            trend_percentage,
            structural_break_detected,
            break_magnitude,
            confidence: sample_confidence(series.len()),
            volatility: stats::std_dev(series),
            description,
        })
    }

    /// Run the smoothing recursion and return the final level and trend.
    pub fn smooth(&self, series: &[f64]) -> HoltState {
        let (alpha, beta) = (self.params.alpha, self.params.beta);
        let Some((&first, rest)) = series.split_first() else {
            return HoltState { level: 0.0, trend: 0.0 };
        };
        let last = *rest.last().unwrap_or(&first);

        let mut level = first;
        let mut trend = (last - first) / series.len() as f64;
        for &value in rest {
            let prev_level = level;
            level = alpha * value + (1.0 - alpha) * (level + trend);
            trend = beta * (level - prev_level) + (1.0 - beta) * trend;
        }
        HoltState { level, trend }
    }

    /// Index where the trailing window starts; also the break-magnitude split.
    pub fn split_index(&self, len: usize) -> usize {
        let keep = 1.0 - self.params.break_window_fraction;
        ((len as f64 * keep).floor() as usize).min(len)
    }

    /// CUSUM over the trailing window against whole-series mean and σ.
    /// Returns the index at which the alarm fired.
    pub fn detect_structural_break(&self, series: &[f64]) -> Option<usize> {
        if series.len() < self.params.min_samples {
            return None;
        }
        let mean = stats::mean(series);
        let sd = stats::std_dev(series);
        if sd == 0.0 {
            return None;
        }

        let threshold = self.params.cusum_threshold_sigmas * sd;
        let mut cusum_pos = 0.0f64;
        let mut cusum_neg = 0.0f64;
        let start = self.split_index(series.len());
        for (i, value) in series.iter().enumerate().skip(start) {
            let deviation = value - mean;
            cusum_pos = (cusum_pos + deviation).max(0.0);
            cusum_neg = (cusum_neg + deviation).min(0.0);
            if cusum_pos.abs() > threshold || cusum_neg.abs() > threshold {
                warn!(
                    "Structural break detected at index {} (CUSUM pos={:.4}, neg={:.4}, threshold={:.4})",
                    i, cusum_pos, cusum_neg, threshold
                );
                return Some(i);
            }
        }
        None
    }

    fn break_magnitude(&self, series: &[f64]) -> f64 {
        let split = self.split_index(series.len());
        let (before, after) = series.split_at(split);
        (stats::mean(after) - stats::mean(before)).abs()
    }

    fn describe(&self, trend_percentage: f64, structural_break: bool) -> String {
        let mut desc = if trend_percentage.abs() < self.params.stable_band_pct {
            "Attack stable".to_string()
        } else if trend_percentage > 0.0 {
            format!("Attack increasing {:.1}% in trend", trend_percentage)
        } else {
            format!("Attack decreasing {:.1}% in trend", trend_percentage.abs())
        };
        if structural_break {
            desc.push_str(" [STRUCTURAL BREAK DETECTED - recalibration needed]");
        }
        desc
    }

    fn check_series(&self, series: &[f64]) -> AnalysisResult<()> {
        if series.len() < self.params.min_samples {
            return Err(AnalysisError::InsufficientData {
                needed: self.params.min_samples,
                got: series.len(),
            });
        }
        ensure_finite(series, "goal count")
    }
}

/// `1 − 1/√(n+1)`: grows towards 1 with more observations.
pub fn sample_confidence(n: usize) -> f64 {
    1.0 - 1.0 / ((n + 1) as f64).sqrt()
}

fn aic(series: &[f64], num_params: usize) -> Option<f64> {
    let var = stats::variance(series);
    let n = series.len();
    if var <= 0.0 || n <= num_params {
        return None;
    }
    Some(n as f64 * var.ln() + 2.0 * num_params as f64)
}
