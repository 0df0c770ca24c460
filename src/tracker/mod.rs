pub mod registry;

pub use registry::{MatchRegistry, RunGuard};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::analytics::{AbcPipeline, MatchState};
use crate::db::models::{MatchObservation, MatchSnapshot};
use crate::db::Database;

/// Analyse one match history. Returns `None` below the pipeline's
/// [`min_observations`](AbcPipeline::min_observations).
///
/// Observations without a possession reading are left out of the
/// possession series; the goal series uses every observation.
pub fn build_snapshot(
    pipeline: &AbcPipeline,
    history: &[MatchObservation],
    match_minutes: u32,
) -> Option<MatchSnapshot> {
    if history.len() < pipeline.min_observations() {
        return None;
    }
    let latest = history.last()?;

    let possession: Vec<f64> = history.iter().filter_map(|o| o.possession).collect();
    let goals: Vec<f64> = history.iter().map(|o| o.total_goals() as f64).collect();
    let minutes_remaining = match_minutes.saturating_sub(latest.minute.unwrap_or(0));

    let analysis = pipeline.analyze(
        &possession,
        &goals,
        latest.home_score,
        latest.away_score,
        minutes_remaining,
    );

    Some(MatchSnapshot {
        match_id: latest.match_id.clone(),
        home_team: latest.home_team.clone(),
        away_team: latest.away_team.clone(),
        timestamp: Utc::now(),
        minute: latest.minute,
        status: latest.status,
        home_score: latest.home_score,
        away_score: latest.away_score,
        match_state: MatchState::from_drift(analysis.momentum.drift),
        sample_size: history.len(),
        analysis,
    })
}

/// Everything a snapshot job needs; cheap to clone into each task.
#[derive(Clone)]
pub struct SnapshotContext {
    pub pipeline: Arc<AbcPipeline>,
    pub registry: MatchRegistry,
    pub db: Database,
    pub updates: broadcast::Sender<MatchSnapshot>,
    pub match_minutes: u32,
}

/// Start one blocking analysis job per tracked match that has enough data and
/// no run still in flight. Returns the spawned jobs.
pub fn run_tick(ctx: &SnapshotContext) -> Vec<JoinHandle<()>> {
    let mut jobs = Vec::new();
    let min_observations = ctx.pipeline.min_observations();
    for match_id in ctx.registry.tracked_ids() {
        let len = ctx.registry.history_len(&match_id).unwrap_or(0);
        if len < min_observations {
            debug!("Not enough data for match {} ({} observations)", match_id, len);
            continue;
        }
        let Some(guard) = ctx.registry.try_begin_run(&match_id) else {
            debug!("Match {}: previous analysis still running, skipping tick", match_id);
            continue;
        };

        let ctx = ctx.clone();
        jobs.push(tokio::task::spawn_blocking(move || {
            analyze_and_publish(&ctx, guard.match_id());
        }));
    }
    jobs
}

fn analyze_and_publish(ctx: &SnapshotContext, match_id: &str) {
    let Some(history) = ctx.registry.snapshot(match_id) else {
        return;
    };
    let Some(snapshot) = build_snapshot(&ctx.pipeline, &history, ctx.match_minutes) else {
        return;
    };
    publish(ctx, snapshot);
}

/// Persist a finished snapshot and push it to subscribers.
fn publish(ctx: &SnapshotContext, snapshot: MatchSnapshot) {
    let match_id = snapshot.match_id.clone();
    // Deselected or deleted while this job ran.
    if !ctx.registry.is_tracked(&match_id) {
        debug!("Match {} no longer tracked, dropping snapshot", match_id);
        return;
    }
    if snapshot.analysis.needs_recalibration {
        warn!(
            "Match {}: {} - RECALIBRATION NEEDED ({})",
            match_id, snapshot.match_state, snapshot.analysis.trend_signal.description
        );
    } else {
        info!(
            "Match {}: {} - integration confidence {:.3} ({})",
            match_id,
            snapshot.match_state,
            snapshot.analysis.integration_confidence,
            snapshot.analysis.trend_signal.description
        );
    }

    if let Err(e) = ctx.db.save_snapshot(&snapshot) {
        error!("Failed to save snapshot for match {}: {:#}", match_id, e);
    }
    // No subscribers is the normal state without dashboard clients.
    if ctx.updates.send(snapshot).is_err() {
        debug!("No snapshot subscribers for match {}", match_id);
    }
}

/// Spawns the periodic snapshot loop. Ticks that fall behind are skipped.
pub fn start_snapshot_loop(ctx: SnapshotContext, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Snapshot loop started (interval={:?})", every);
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let jobs = run_tick(&ctx);
            if !jobs.is_empty() {
                debug!("Snapshot tick: {} analyses started", jobs.len());
            }
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analytics::params::{AnalysisParams, SimulationParams, TrendParams};
    use crate::db::models::MatchStatus;

    pub(crate) fn observation(
        match_id: &str,
        minute: u32,
        home_score: u32,
        away_score: u32,
        possession: Option<f64>,
    ) -> MatchObservation {
        MatchObservation {
            match_id: match_id.to_string(),
            timestamp: Utc::now(),
            minute: Some(minute),
            status: MatchStatus::InProgress,
            home_team: "Home".into(),
            away_team: "Away".into(),
            home_score,
            away_score,
            possession,
            shots: 0,
            shots_on_target: 0,
            corners: 0,
            fouls: 0,
            yellow_cards: 0,
            red_cards: 0,
        }
    }

    fn pipeline_with_min_samples(min_samples: usize) -> AbcPipeline {
        AbcPipeline::new(AnalysisParams {
            trend: TrendParams {
                min_samples,
                ..TrendParams::default()
            },
            simulation: SimulationParams {
                simulations: 1_000,
                seed: Some(3),
                ..SimulationParams::default()
            },
            ..AnalysisParams::default()
        })
    }

    fn pipeline() -> AbcPipeline {
        pipeline_with_min_samples(TrendParams::default().min_samples)
    }

    fn history(match_id: &str, n: u32) -> Vec<MatchObservation> {
        (0..n)
            .map(|i| observation(match_id, 30 + i, 1, 0, Some(50.0 + (i % 3) as f64)))
            .collect()
    }

    fn context(registry: MatchRegistry) -> (SnapshotContext, broadcast::Receiver<MatchSnapshot>) {
        context_with(registry, pipeline())
    }

    fn context_with(
        registry: MatchRegistry,
        pipeline: AbcPipeline,
    ) -> (SnapshotContext, broadcast::Receiver<MatchSnapshot>) {
        let (tx, rx) = broadcast::channel(16);
        let ctx = SnapshotContext {
            pipeline: Arc::new(pipeline),
            registry,
            db: Database::open(":memory:").unwrap(),
            updates: tx,
            match_minutes: 90,
        };
        (ctx, rx)
    }

    #[test]
    fn short_history_is_not_analysed() {
        assert!(build_snapshot(&pipeline(), &history("1", 9), 90).is_none());
        assert!(build_snapshot(&pipeline(), &[], 90).is_none());
    }

    #[test]
    fn snapshot_reflects_latest_observation() {
        let hist = history("1", 12);
        let snap = build_snapshot(&pipeline(), &hist, 90).unwrap();
        assert_eq!(snap.match_id, "1");
        assert_eq!(snap.minute, Some(41));
        assert_eq!(snap.home_score, 1);
        assert_eq!(snap.sample_size, 12);
        assert_eq!(snap.match_state, MatchState::from_drift(snap.analysis.momentum.drift));
        assert_eq!(snap.analysis.momentum.sample_size, 11);
    }

    #[test]
    fn missing_possession_is_skipped() {
        let mut hist = history("1", 12);
        hist[3].possession = None;
        hist[7].possession = None;
        let snap = build_snapshot(&pipeline(), &hist, 90).unwrap();
        assert_eq!(snap.analysis.momentum.sample_size, 9);
    }

    #[test]
    fn stoppage_time_leaves_no_minutes() {
        let mut hist = history("1", 12);
        for o in hist.iter_mut() {
            o.minute = Some(95);
        }
        let snap = build_snapshot(&pipeline(), &hist, 90).unwrap();
        // Nothing left to simulate: the current 1-0 stands.
        assert_eq!(snap.analysis.outcome.probability_home_win, 1.0);
        assert_eq!(snap.analysis.outcome.expected_final_score, "1-0");
    }

    #[tokio::test]
    async fn tick_analyses_ready_matches_and_publishes() {
        let registry = MatchRegistry::new();
        registry.select(&["1".to_string(), "2".to_string()]);
        for o in history("1", 12) {
            registry.record(o);
        }
        for o in history("2", 3) {
            registry.record(o);
        }
        let (ctx, mut rx) = context(registry.clone());

        let jobs = run_tick(&ctx);
        assert_eq!(jobs.len(), 1);
        for job in jobs {
            job.await.unwrap();
        }

        let published = rx.recv().await.unwrap();
        assert_eq!(published.match_id, "1");
        assert!(ctx.db.latest_snapshot("1").unwrap().is_some());
        assert!(ctx.db.latest_snapshot("2").unwrap().is_none());
        // Guard released after the job.
        assert!(registry.try_begin_run("1").is_some());
    }

    #[tokio::test]
    async fn tick_skips_match_with_run_in_flight() {
        let registry = MatchRegistry::new();
        registry.select(&["1".to_string()]);
        for o in history("1", 12) {
            registry.record(o);
        }
        let (ctx, _rx) = context(registry.clone());

        let held = registry.try_begin_run("1").unwrap();
        assert!(run_tick(&ctx).is_empty());
        drop(held);
        let jobs = run_tick(&ctx);
        assert_eq!(jobs.len(), 1);
        for job in jobs {
            job.await.unwrap();
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_still_persists() {
        let registry = MatchRegistry::new();
        registry.select(&["1".to_string()]);
        for o in history("1", 10) {
            registry.record(o);
        }
        let (ctx, rx) = context(registry);
        drop(rx);
        for job in run_tick(&ctx) {
            job.await.unwrap();
        }
        assert_eq!(ctx.db.list_snapshots().unwrap().len(), 1);
    }

    #[test]
    fn minimum_history_follows_trend_sample_setting() {
        let short = pipeline_with_min_samples(5);
        assert!(build_snapshot(&short, &history("1", 4), 90).is_none());
        let snap = build_snapshot(&short, &history("1", 5), 90).unwrap();
        assert_eq!(snap.sample_size, 5);
        assert_ne!(snap.analysis.trend_signal.description, "Insufficient data");

        let long = pipeline_with_min_samples(12);
        assert!(build_snapshot(&long, &history("1", 11), 90).is_none());
        assert!(build_snapshot(&long, &history("1", 12), 90).is_some());
    }

    #[tokio::test]
    async fn tick_gate_uses_configured_minimum() {
        let registry = MatchRegistry::new();
        registry.select(&["1".to_string()]);
        for o in history("1", 6) {
            registry.record(o);
        }
        let (ctx, _rx) = context_with(registry.clone(), pipeline_with_min_samples(12));
        assert!(run_tick(&ctx).is_empty());

        let (ctx, mut rx) = context_with(registry, pipeline_with_min_samples(6));
        let jobs = run_tick(&ctx);
        assert_eq!(jobs.len(), 1);
        for job in jobs {
            job.await.unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().sample_size, 6);
    }

    #[tokio::test]
    async fn untracked_match_snapshot_is_dropped() {
        let registry = MatchRegistry::new();
        registry.select(&["1".to_string()]);
        for o in history("1", 12) {
            registry.record(o);
        }
        let (ctx, mut rx) = context(registry.clone());
        // The job copied the history, then the match was deleted.
        let history = registry.snapshot("1").unwrap();
        registry.untrack("1");

        let snap = build_snapshot(&ctx.pipeline, &history, 90).unwrap();
        publish(&ctx, snap);
        assert!(ctx.db.latest_snapshot("1").unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }
}
