use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::analytics::params::{
    AnalysisParams, MomentumParams, PipelineParams, SimulationParams, TrendParams,
};

/// Live football match analytics: goal trend, momentum and outcome forecasts
#[derive(Parser, Debug, Clone)]
#[command(name = "match-analytics", version, about)]
pub struct Config {
    /// Dashboard / API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// SQLite database path
    #[arg(long, env = "DATABASE_PATH", default_value = "match-analytics.db")]
    pub database_path: String,

    // ── Provider ─────────────────────────────────────────────────────────────
    /// API-Football key
    #[arg(long, env = "FOOTBALL_API_KEY")]
    pub football_api_key: Option<String>,

    /// API-Football base URL
    #[arg(
        long,
        env = "FOOTBALL_API_URL",
        default_value = "https://v3.football.api-sports.io"
    )]
    pub football_api_url: String,

    /// Value of the x-apisports-host header
    #[arg(long, env = "FOOTBALL_API_HOST", default_value = "v3.football.api-sports.io")]
    pub football_api_host: String,

    /// Match IDs to track from startup (comma separated)
    #[arg(long, env = "MATCHES", value_delimiter = ',')]
    pub matches: Vec<String>,

    /// Periodically replace the tracked set with all live fixtures
    #[arg(long, env = "AUTO_DISCOVER", default_value = "false")]
    pub auto_discover: bool,

    /// Auto-discovery interval in seconds
    #[arg(long, env = "DISCOVERY_INTERVAL_SECS", default_value = "300")]
    pub discovery_interval_secs: u64,

    /// Provider polling interval in seconds
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "15")]
    pub poll_interval_secs: u64,

    /// Snapshot (analysis) interval in seconds
    #[arg(long, env = "SNAPSHOT_INTERVAL_SECS", default_value = "15")]
    pub snapshot_interval_secs: u64,

    /// Regulation match length in minutes
    #[arg(long, env = "MATCH_MINUTES", default_value = "90")]
    pub match_minutes: u32,

    // ── Model ────────────────────────────────────────────────────────────────
    /// Level smoothing constant α
    #[arg(long, env = "SMOOTHING_ALPHA", default_value = "0.3")]
    pub smoothing_alpha: f64,

    /// Trend smoothing constant β
    #[arg(long, env = "SMOOTHING_BETA", default_value = "0.1")]
    pub smoothing_beta: f64,

    /// Base goal rate in goals per minute
    #[arg(long, env = "BASE_GOAL_RATE", default_value = "0.03")]
    pub base_goal_rate: f64,

    /// CUSUM structural-break threshold in standard deviations
    #[arg(long, env = "CUSUM_THRESHOLD_SIGMAS", default_value = "3.0")]
    pub cusum_threshold_sigmas: f64,

    /// Trailing fraction of the goal series scanned for breaks
    #[arg(long, env = "BREAK_WINDOW_FRACTION", default_value = "0.3")]
    pub break_window_fraction: f64,

    /// z-score of the forecast confidence interval
    #[arg(long, env = "FORECAST_Z", default_value = "1.96")]
    pub forecast_z: f64,

    /// Goal forecast horizon in observation steps
    #[arg(long, env = "FORECAST_HORIZON", default_value = "10")]
    pub forecast_horizon: usize,

    /// Monte Carlo runs per analysis
    #[arg(long, env = "SIMULATIONS", default_value = "10000")]
    pub simulations: usize,

    /// Momentum volatility above which recalibration is requested
    #[arg(long, env = "RECALIBRATION_VOLATILITY", default_value = "0.15")]
    pub recalibration_volatility: f64,

    /// Minimum goal observations for trend extraction
    #[arg(long, env = "MIN_TREND_SAMPLES", default_value = "10")]
    pub min_trend_samples: usize,

    /// Minimum possession observations for momentum estimation
    #[arg(long, env = "MIN_MOMENTUM_SAMPLES", default_value = "2")]
    pub min_momentum_samples: usize,

    /// Fixed simulation seed for reproducible forecasts
    #[arg(long, env = "SIMULATION_SEED")]
    pub simulation_seed: Option<u64>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.football_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            anyhow::bail!("FOOTBALL_API_KEY is required to poll live match data.");
        }
        let url = url::Url::parse(&self.football_api_url)
            .map_err(|e| anyhow::anyhow!("football_api_url is invalid: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("football_api_url must be http(s)");
        }
        self.dashboard_addr
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("dashboard_addr is invalid: {}", e))?;

        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            anyhow::bail!("smoothing_alpha must be in (0, 1]");
        }
        if !(self.smoothing_beta > 0.0 && self.smoothing_beta <= 1.0) {
            anyhow::bail!("smoothing_beta must be in (0, 1]");
        }
        if !(self.break_window_fraction > 0.0 && self.break_window_fraction < 1.0) {
            anyhow::bail!("break_window_fraction must be in (0, 1)");
        }
        if !(self.base_goal_rate > 0.0 && self.base_goal_rate.is_finite()) {
            anyhow::bail!("base_goal_rate must be positive");
        }
        if !(self.cusum_threshold_sigmas > 0.0) {
            anyhow::bail!("cusum_threshold_sigmas must be positive");
        }
        if !(self.forecast_z > 0.0) {
            anyhow::bail!("forecast_z must be positive");
        }
        if !(self.recalibration_volatility >= 0.0) {
            anyhow::bail!("recalibration_volatility must not be negative");
        }
        if self.forecast_horizon == 0 {
            anyhow::bail!("forecast_horizon must be at least 1");
        }
        if self.simulations == 0 {
            anyhow::bail!("simulations must be at least 1");
        }
        if self.min_trend_samples < 2 {
            anyhow::bail!("min_trend_samples must be at least 2");
        }
        if self.min_momentum_samples < 2 {
            anyhow::bail!("min_momentum_samples must be at least 2");
        }
        if self.poll_interval_secs == 0 || self.snapshot_interval_secs == 0 || self.discovery_interval_secs == 0 {
            anyhow::bail!("intervals must be at least one second");
        }
        if self.match_minutes == 0 {
            anyhow::bail!("match_minutes must be positive");
        }
        Ok(())
    }

    /// Model parameters with every command-line override applied.
    pub fn analysis_params(&self) -> AnalysisParams {
        AnalysisParams {
            trend: TrendParams {
                alpha: self.smoothing_alpha,
                beta: self.smoothing_beta,
                base_goal_rate: self.base_goal_rate,
                cusum_threshold_sigmas: self.cusum_threshold_sigmas,
                break_window_fraction: self.break_window_fraction,
                forecast_z: self.forecast_z,
                forecast_horizon: self.forecast_horizon,
                min_samples: self.min_trend_samples,
                ..TrendParams::default()
            },
            momentum: MomentumParams {
                min_observations: self.min_momentum_samples,
                ..MomentumParams::default()
            },
            simulation: SimulationParams {
                base_goal_rate: self.base_goal_rate,
                simulations: self.simulations,
                seed: self.simulation_seed,
            },
            pipeline: PipelineParams {
                recalibration_volatility: self.recalibration_volatility,
                ..PipelineParams::default()
            },
        }
    }

    /// Startup selection with blanks and duplicates removed.
    pub fn initial_matches(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for id in self.matches.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !ids.iter().any(|known| known == id) {
                ids.push(id.to_string());
            }
        }
        ids
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Config {
        let mut args = vec!["match-analytics", "--football-api-key", "k"];
        args.extend_from_slice(extra);
        Config::try_parse_from(args).unwrap()
    }

    #[test]
    fn defaults_are_valid_and_match_model_defaults() {
        let cfg = parse(&[]);
        cfg.validate().unwrap();
        assert_eq!(cfg.analysis_params(), AnalysisParams::default());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(15));
        assert_eq!(cfg.snapshot_interval(), Duration::from_secs(15));
        assert_eq!(cfg.match_minutes, 90);
        assert!(!cfg.auto_discover);
    }

    #[test]
    fn overrides_reach_analysis_params() {
        let cfg = parse(&[
            "--smoothing-alpha",
            "0.5",
            "--simulations",
            "500",
            "--simulation-seed",
            "9",
            "--recalibration-volatility",
            "0.2",
            "--min-trend-samples",
            "12",
        ]);
        let p = cfg.analysis_params();
        assert_eq!(p.trend.alpha, 0.5);
        assert_eq!(p.trend.min_samples, 12);
        assert_eq!(p.simulation.simulations, 500);
        assert_eq!(p.simulation.seed, Some(9));
        assert_eq!(p.pipeline.recalibration_volatility, 0.2);
    }

    #[test]
    fn match_list_is_split_and_cleaned() {
        let cfg = parse(&["--matches", "101, 102,,101"]);
        assert_eq!(cfg.initial_matches(), vec!["101", "102"]);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--smoothing-alpha", "0"]).validate().is_err());
        assert!(parse(&["--smoothing-beta", "1.5"]).validate().is_err());
        assert!(parse(&["--break-window-fraction", "1.0"]).validate().is_err());
        assert!(parse(&["--simulations", "0"]).validate().is_err());
        assert!(parse(&["--forecast-horizon", "0"]).validate().is_err());
        assert!(parse(&["--football-api-url", "ftp://example.com"]).validate().is_err());
        assert!(parse(&["--dashboard-addr", "not-an-addr"]).validate().is_err());
        assert!(parse(&["--poll-interval-secs", "0"]).validate().is_err());
    }

    #[test]
    fn api_key_is_required() {
        let cfg = Config::try_parse_from(["match-analytics"]).unwrap();
        assert!(cfg.validate().is_err());
    }
}
