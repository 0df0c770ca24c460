//! Bayesian momentum estimation from possession swings.
//!
//! Possession changes between observations are treated as draws from a
//! normal distribution whose mean is the momentum ("drift"). A conjugate
//! normal prior is updated in closed form; the prior is either neutral or
//! derived from the goal [`TrendSignal`] so that the scoring trend pulls the
//! estimate towards itself.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ensure_finite, or_neutral, AnalysisError, AnalysisResult};
use super::params::MomentumParams;
use super::stats;
use super::trend::{sample_confidence, TrendSignal};

/// Possession is reported as a percentage.
const POSSESSION_SCALE: f64 = 100.0;

/// Normal prior on the drift, with its weight expressed as a pseudo-count.
#[derive(Debug, Clone, PartialEq)]
pub struct Prior {
    pub mean: f64,
    pub variance: f64,
    pub pseudo_count: f64,
    /// Confidence multiplier from the source signal (1.0 when none applies).
    pub confidence_factor: f64,
}

impl Prior {
    /// Uninformed prior: zero momentum, unit weight.
    pub fn neutral(params: &MomentumParams) -> Self {
        Prior {
            mean: 0.0,
            variance: params.prior_variance,
            pseudo_count: 1.0,
            confidence_factor: 1.0,
        }
    }

    /// Prior shifted and tightened by the goal trend.
    ///
    /// A confident trend gives a narrower prior with more weight; a trend
    /// that saw a structural break discounts the resulting confidence.
    pub fn from_trend(signal: &TrendSignal, params: &MomentumParams) -> Self {
        Prior {
            mean: signal.trend * params.trend_to_possession_scale,
            variance: params.prior_variance * (2.0 - signal.confidence),
            pseudo_count: 1.0 + signal.confidence,
            confidence_factor: if signal.structural_break_detected {
                params.break_confidence_penalty
            } else {
                1.0
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MomentumEstimate {
    /// Posterior mean; positive favours the home side.
    pub drift: f64,
    pub volatility: f64,
    pub confidence: f64,
    pub sample_size: usize,
    pub prior_mean: f64,
    pub prior_variance: f64,
    pub posterior_mean: f64,
    pub posterior_variance: f64,
}

impl MomentumEstimate {
    pub fn neutral(params: &MomentumParams) -> Self {
        MomentumEstimate {
            drift: 0.0,
            volatility: 0.0,
            confidence: 0.0,
            sample_size: 0,
            prior_mean: 0.0,
            prior_variance: params.prior_variance,
            posterior_mean: 0.0,
            posterior_variance: 0.0,
        }
    }
}

/// Possession swings between consecutive observations, as fractions.
pub fn possession_changes(possession: &[f64]) -> Vec<f64> {
    stats::scaled_differences(possession, POSSESSION_SCALE)
}

#[derive(Debug, Clone)]
pub struct MomentumEstimator {
    params: MomentumParams,
}

impl Default for MomentumEstimator {
    fn default() -> Self {
        Self::new(MomentumParams::default())
    }
}

impl MomentumEstimator {
    pub fn new(params: MomentumParams) -> Self {
        MomentumEstimator { params }
    }

    pub fn params(&self) -> &MomentumParams {
        &self.params
    }

    #[cfg(test)]
    pub fn neutral_prior(&self) -> Prior {
        Prior::neutral(&self.params)
    }

    pub fn informed_prior(&self, signal: &TrendSignal) -> Prior {
        Prior::from_trend(signal, &self.params)
    }

    pub fn estimate(&self, changes: &[f64], prior: &Prior) -> MomentumEstimate {
        or_neutral("momentum", self.try_estimate(changes, prior), || {
            MomentumEstimate::neutral(&self.params)
        })
    }

    pub fn estimate_from_possession(&self, possession: &[f64], prior: &Prior) -> MomentumEstimate {
        self.estimate(&possession_changes(possession), prior)
    }

    /// Conjugate-normal update of `prior` with the sample of `changes`.
    pub fn try_estimate(&self, changes: &[f64], prior: &Prior) -> AnalysisResult<MomentumEstimate> {
        let min_changes = self.params.min_observations.saturating_sub(1).max(1);
        if changes.len() < min_changes {
            return Err(AnalysisError::InsufficientData {
                needed: self.params.min_observations,
                got: changes.len() + usize::from(!changes.is_empty()),
            });
        }
        ensure_finite(changes, "possession change")?;
        ensure_finite(&[prior.mean, prior.variance, prior.pseudo_count], "prior")?;

        let n = changes.len() as f64;
        let sample_mean = stats::mean(changes);
        let sample_variance = stats::variance(changes);

        let n0 = prior.pseudo_count;
        let posterior_n = n0 + n;
        let posterior_mean = (n0 * prior.mean + n * sample_mean) / posterior_n;
        let posterior_variance = (n0 * prior.variance
            + n * sample_variance
            + (n0 * n / posterior_n) * (sample_mean - prior.mean).powi(2))
            / posterior_n;

        if !posterior_mean.is_finite() || !posterior_variance.is_finite() || posterior_variance < 0.0 {
            return Err(AnalysisError::Unexpected(format!(
                "posterior out of range: mean={} variance={}",
                posterior_mean, posterior_variance
            )));
        }

        let confidence = sample_confidence(changes.len()) * prior.confidence_factor;
        debug!(
            "Bayesian update: prior mean={:.5}, posterior mean={:.5}, confidence={:.3}",
            prior.mean, posterior_mean, confidence
        );

        Ok(MomentumEstimate {
            drift: posterior_mean,
            volatility: posterior_variance.sqrt(),
            confidence,
            sample_size: changes.len(),
            prior_mean: prior.mean,
            prior_variance: prior.variance,
            posterior_mean,
            posterior_variance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn signal(trend: f64, confidence: f64, broken: bool) -> TrendSignal {
        TrendSignal {
            trend,
            trend_percentage: trend / 0.03 * 100.0,
            structural_break_detected: broken,
            break_magnitude: 0.0,
            confidence,
            volatility: 0.0,
            description: String::new(),
        }
    }

    #[test]
    fn possession_changes_are_fractions() {
        let c = possession_changes(&[50.0, 52.0, 49.0]);
        assert_relative_eq!(c[0], 0.02, epsilon = 1e-12);
        assert_relative_eq!(c[1], -0.03, epsilon = 1e-12);
    }

    #[test]
    fn single_observation_returns_neutral_default() {
        let est = MomentumEstimator::default();
        let m = est.estimate_from_possession(&[55.0], &est.neutral_prior());
        assert_eq!(m, MomentumEstimate::neutral(est.params()));
        assert_eq!(m.prior_variance, 0.01);
        assert_eq!(m.sample_size, 0);

        let err = est.try_estimate(&[], &est.neutral_prior()).unwrap_err();
        assert_eq!(err, AnalysisError::InsufficientData { needed: 2, got: 0 });
    }

    #[test]
    fn neutral_prior_update_matches_closed_form() {
        let est = MomentumEstimator::default();
        let m = est.estimate(&[0.02, 0.04], &est.neutral_prior());
        // m = 0.03, v = 0.0002, n = 2, n0 = 1
        assert_relative_eq!(m.posterior_mean, 0.02, epsilon = 1e-12);
        assert_relative_eq!(m.posterior_variance, 0.011 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(m.drift, m.posterior_mean, epsilon = 0.0);
        assert_relative_eq!(m.volatility, (0.011f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(m.confidence, 1.0 - 1.0 / 3f64.sqrt(), epsilon = 1e-12);
        assert_eq!(m.sample_size, 2);
        assert_eq!(m.prior_mean, 0.0);
    }

    #[test]
    fn single_change_uses_zero_sample_variance() {
        let est = MomentumEstimator::default();
        let m = est.estimate_from_possession(&[50.0, 60.0], &est.neutral_prior());
        // n = 1, m = 0.1: mean 0.05, variance (0.01 + 0 + 0.5*0.01)/2
        assert_relative_eq!(m.drift, 0.05, epsilon = 1e-12);
        assert_relative_eq!(m.posterior_variance, 0.0075, epsilon = 1e-12);
    }

    #[test]
    fn informed_prior_derivation() {
        let params = MomentumParams::default();
        let p = Prior::from_trend(&signal(0.02, 0.8, false), &params);
        assert_relative_eq!(p.mean, 0.2, epsilon = 1e-12);
        assert_relative_eq!(p.variance, 0.012, epsilon = 1e-12);
        assert_relative_eq!(p.pseudo_count, 1.8, epsilon = 1e-12);
        assert_eq!(p.confidence_factor, 1.0);

        let broken = Prior::from_trend(&signal(0.02, 0.8, true), &params);
        assert_eq!(broken.confidence_factor, 0.7);
    }

    #[test]
    fn informed_prior_pulls_drift_towards_trend() {
        let est = MomentumEstimator::default();
        // Home side steadily gaining possession.
        let possession: Vec<f64> = (0..15).map(|i| 45.0 + i as f64 * 1.5).collect();
        let neutral = est.estimate_from_possession(&possession, &est.neutral_prior());

        let trend = signal(0.05, 0.9, false);
        let prior = est.informed_prior(&trend);
        let informed = est.estimate_from_possession(&possession, &prior);

        assert!(neutral.drift > 0.0);
        assert!(prior.mean > neutral.drift);
        assert!(
            informed.drift > neutral.drift && informed.drift < prior.mean,
            "neutral={} informed={} prior={}",
            neutral.drift,
            informed.drift,
            prior.mean
        );
    }

    #[test]
    fn structural_break_penalises_confidence() {
        let est = MomentumEstimator::default();
        let changes = [0.01, -0.02, 0.03, 0.0];
        let calm = est.estimate(&changes, &est.informed_prior(&signal(0.01, 0.7, false)));
        let broken = est.estimate(&changes, &est.informed_prior(&signal(0.01, 0.7, true)));
        assert_relative_eq!(broken.confidence, calm.confidence * 0.7, epsilon = 1e-12);
        assert_relative_eq!(broken.drift, calm.drift, epsilon = 1e-12);
    }

    #[test]
    fn nan_possession_is_unexpected_but_estimate_never_fails() {
        let est = MomentumEstimator::default();
        let changes = [0.01, f64::NAN];
        assert!(!est.try_estimate(&changes, &est.neutral_prior()).unwrap_err().is_expected());
        assert_eq!(
            est.estimate(&changes, &est.neutral_prior()),
            MomentumEstimate::neutral(est.params())
        );
    }
}
