//! Monte Carlo simulation of the remaining match time.
//!
//! Each side scores according to an independent Poisson process whose rate
//! is the base goal rate tilted by the momentum drift. The simulator plays
//! out the remaining minutes many times and aggregates final scores into
//! outcome probabilities, the most likely scorelines and the distribution of
//! total goals.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::error::{or_neutral, AnalysisError, AnalysisResult};
use super::params::SimulationParams;

/// Total-goal percentile levels reported with every distribution.
pub const PERCENTILE_LEVELS: [u32; 5] = [5, 25, 50, 75, 95];

/// Number of scorelines kept in `top_scores`.
const TOP_SCORES: usize = 5;

/// Largest λ sampled in one go by Knuth's method; bigger rates are split.
const KNUTH_MAX_LAMBDA: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreProbability {
    /// Final score as "home-away".
    pub score: String,
    pub probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalPercentile {
    pub level: u32,
    pub total_goals: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeDistribution {
    pub simulation_count: usize,
    pub probability_home_win: f64,
    pub probability_draw: f64,
    pub probability_away_win: f64,
    pub expected_final_score: String,
    pub top_scores: Vec<ScoreProbability>,
    /// P(at least one more goal).
    pub probability_additional_goal: f64,
    /// Mean final total goals (current score included).
    pub expected_total_goals: f64,
    /// P(home wins) when home is currently behind, else 0.
    pub probability_comeback: f64,
    /// P(home wins) when home is currently ahead, else 0.
    pub probability_hold_lead: f64,
    pub goal_count_percentiles: Vec<GoalPercentile>,
}

impl OutcomeDistribution {
    /// Uninformative 1/3 split used when no simulation could run.
    pub fn neutral(simulation_count: usize) -> Self {
        OutcomeDistribution {
            simulation_count,
            probability_home_win: 0.33,
            probability_draw: 0.34,
            probability_away_win: 0.33,
            expected_final_score: "0-0".to_string(),
            top_scores: Vec::new(),
            probability_additional_goal: 0.5,
            expected_total_goals: 0.0,
            probability_comeback: 0.0,
            probability_hold_lead: 0.0,
            goal_count_percentiles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeSimulator {
    params: SimulationParams,
}

impl Default for OutcomeSimulator {
    fn default() -> Self {
        Self::new(SimulationParams::default())
    }
}

impl OutcomeSimulator {
    pub fn new(params: SimulationParams) -> Self {
        OutcomeSimulator { params }
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Same simulator with a fixed RNG seed: every run is bit-identical.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = Some(seed);
        self
    }

    /// Simulate `simulations` match endings. Never fails: degenerate or
    /// broken input yields [`OutcomeDistribution::neutral`].
    ///
    /// `volatility` is part of the interface but does not enter the rate
    /// model; goal counts are plain Poisson.
    pub fn simulate(
        &self,
        home_score: u32,
        away_score: u32,
        drift: f64,
        volatility: f64,
        simulations: usize,
        minutes_remaining: u32,
    ) -> OutcomeDistribution {
        or_neutral(
            "outcome simulation",
            self.try_simulate(home_score, away_score, drift, volatility, simulations, minutes_remaining),
            || OutcomeDistribution::neutral(simulations),
        )
    }

    /// Like [`simulate`](Self::simulate) but with the configured run count.
    pub fn simulate_default(
        &self,
        home_score: u32,
        away_score: u32,
        drift: f64,
        volatility: f64,
        minutes_remaining: u32,
    ) -> OutcomeDistribution {
        self.simulate(home_score, away_score, drift, volatility, self.params.simulations, minutes_remaining)
    }

    pub fn try_simulate(
        &self,
        home_score: u32,
        away_score: u32,
        drift: f64,
        volatility: f64,
        simulations: usize,
        minutes_remaining: u32,
    ) -> AnalysisResult<OutcomeDistribution> {
        let mut rng = match self.params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.simulate_with_rng(
            &mut rng,
            home_score,
            away_score,
            drift,
            volatility,
            simulations,
            minutes_remaining,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn simulate_with_rng<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        home_score: u32,
        away_score: u32,
        drift: f64,
        _volatility: f64,
        simulations: usize,
        minutes_remaining: u32,
    ) -> AnalysisResult<OutcomeDistribution> {
        if simulations == 0 {
            return Err(AnalysisError::Degenerate("zero simulations requested"));
        }
        if !drift.is_finite() {
            return Err(AnalysisError::Unexpected(format!("non-finite drift: {}", drift)));
        }

        let minutes = minutes_remaining as f64;
        let home_rate = self.params.base_goal_rate * (1.0 + drift);
        let away_rate = self.params.base_goal_rate * (1.0 - drift);
        let home_expected = (home_rate * minutes).max(0.0);
        let away_expected = (away_rate * minutes).max(0.0);

        let mut home_wins = 0usize;
        let mut draws = 0usize;
        let mut more_goals = 0usize;
        let mut totals: Vec<u32> = Vec::with_capacity(simulations);
        // Scoreline frequencies in first-seen order.
        let mut score_index: HashMap<(u32, u32), usize> = HashMap::new();
        let mut score_counts: Vec<((u32, u32), usize)> = Vec::new();

        for _ in 0..simulations {
            let home_goals = sample_poisson(rng, home_expected);
            let away_goals = sample_poisson(rng, away_expected);
            let final_home = home_score + home_goals;
            let final_away = away_score + away_goals;

            match final_home.cmp(&final_away) {
                std::cmp::Ordering::Greater => home_wins += 1,
                std::cmp::Ordering::Equal => draws += 1,
                std::cmp::Ordering::Less => {}
            }
            if home_goals + away_goals > 0 {
                more_goals += 1;
            }

            let key = (final_home, final_away);
            match score_index.get(&key) {
                Some(&idx) => score_counts[idx].1 += 1,
                None => {
                    score_index.insert(key, score_counts.len());
                    score_counts.push((key, 1));
                }
            }
            totals.push(final_home + final_away);
        }

        let n = simulations as f64;
        let probability_home_win = home_wins as f64 / n;
        // Away takes the remainder so the three sum to exactly 1.0.
        let (probability_draw, probability_away_win) = if home_wins + draws == simulations {
            (1.0 - probability_home_win, 0.0)
        } else {
            let draw = draws as f64 / n;
            (draw, 1.0 - (probability_home_win + draw))
        };

        // Stable sort keeps first-seen order among equal counts.
        score_counts.sort_by(|a, b| b.1.cmp(&a.1));
        let top_scores: Vec<ScoreProbability> = score_counts
            .iter()
            .take(TOP_SCORES)
            .map(|((h, a), count)| ScoreProbability {
                score: format_score(*h, *a),
                probability: *count as f64 / n,
            })
            .collect();
        let expected_final_score = top_scores
            .first()
            .map(|s| s.score.clone())
            .unwrap_or_else(|| format_score(home_score, away_score));

        let expected_total_goals = totals.iter().map(|&t| t as f64).sum::<f64>() / n;

        let (probability_comeback, probability_hold_lead) = match home_score.cmp(&away_score) {
            std::cmp::Ordering::Less => (probability_home_win, 0.0),
            std::cmp::Ordering::Greater => (0.0, probability_home_win),
            std::cmp::Ordering::Equal => (0.0, 0.0),
        };

        totals.sort_unstable();
        let goal_count_percentiles = PERCENTILE_LEVELS
            .iter()
            .map(|&level| GoalPercentile {
                level,
                total_goals: nearest_rank(&totals, level) as f64,
            })
            .collect();

        debug!(
            "Monte Carlo ({} runs, λ={:.3}/{:.3}): P(home)={:.3} P(draw)={:.3} P(away)={:.3}",
            simulations, home_expected, away_expected, probability_home_win, probability_draw, probability_away_win
        );

        Ok(OutcomeDistribution {
            simulation_count: simulations,
            probability_home_win,
            probability_draw,
            probability_away_win,
            expected_final_score,
            top_scores,
            probability_additional_goal: more_goals as f64 / n,
            expected_total_goals,
            probability_comeback,
            probability_hold_lead,
            goal_count_percentiles,
        })
    }
}

/// Value at index ⌊len·level/100⌋ of an ascending slice (no interpolation).
fn nearest_rank(sorted: &[u32], level: u32) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let idx = (sorted.len() * level as usize / 100).min(sorted.len() - 1);
    sorted[idx]
}

fn format_score(home: u32, away: u32) -> String {
    format!("{}-{}", home, away)
}

/// Draw from Poisson(λ) with Knuth's multiplication method. Large rates are
/// split into chunks and summed, which is exact by additivity.
pub fn sample_poisson<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    if !(lambda > 0.0) {
        return 0;
    }
    let mut remaining = lambda;
    let mut total = 0u32;
    while remaining > 0.0 {
        let step = remaining.min(KNUTH_MAX_LAMBDA);
        remaining -= step;
        let limit = (-step).exp();
        let mut p = 1.0f64;
        let mut k = 0u32;
        loop {
            p *= rng.gen::<f64>();
            if p <= limit {
                break;
            }
            k += 1;
        }
        total += k;
    }
    total
}
