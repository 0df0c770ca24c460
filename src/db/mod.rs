use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

pub mod models;
use models::*;

/// Thread-safe SQLite handle (single connection with mutex)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the SQLite database at the given path
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("opening database {}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let db = Database {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run schema migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        self.conn()?.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| anyhow!("database connection mutex poisoned"))
    }

    // ── Snapshots ─────────────────────────────────────────────────────────────

    /// Store a snapshot, replacing the previous one for the same match
    pub fn save_snapshot(&self, snapshot: &MatchSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO match_snapshots (match_id, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(match_id) DO UPDATE SET
                payload=excluded.payload,
                updated_at=excluded.updated_at",
            params![snapshot.match_id, payload, Utc::now()],
        )?;
        Ok(())
    }

    /// Latest snapshot for one match, if any was stored
    pub fn latest_snapshot(&self, match_id: &str) -> Result<Option<MatchSnapshot>> {
        let conn = self.conn()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM match_snapshots WHERE match_id = ?1",
                params![match_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).context("decoding stored snapshot"))
            .transpose()
    }

    /// Latest snapshot of every match, most recently updated first
    pub fn list_snapshots(&self) -> Result<Vec<MatchSnapshot>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT payload FROM match_snapshots ORDER BY updated_at DESC, match_id")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        payloads
            .iter()
            .map(|p| serde_json::from_str(p).context("decoding stored snapshot"))
            .collect()
    }

    /// Remove a match's snapshot; returns whether one existed
    pub fn delete_snapshot(&self, match_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM match_snapshots WHERE match_id = ?1", params![match_id])?;
        Ok(n > 0)
    }

    // ── Active selection ──────────────────────────────────────────────────────

    /// Replace the persisted set of tracked matches
    pub fn save_active_matches(&self, match_ids: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM active_matches", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO active_matches (match_id, selected_at) VALUES (?1, ?2)",
            )?;
            let now = Utc::now();
            for id in match_ids {
                stmt.execute(params![id, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Persisted tracked matches, in selection order
    pub fn active_matches(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT match_id FROM active_matches ORDER BY rowid")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }
}

/// SQLite schema (idempotent CREATE IF NOT EXISTS)
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS match_snapshots (
    match_id    TEXT    PRIMARY KEY,
    payload     TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS active_matches (
    match_id    TEXT    PRIMARY KEY,
    selected_at TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_match_snapshots_updated ON match_snapshots(updated_at);
"#;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analytics::AbcPipeline;
    use crate::analytics::MatchState;

    pub(crate) fn sample_snapshot(match_id: &str, home_score: u32) -> MatchSnapshot {
        let analysis = AbcPipeline::default().analyze(&[50.0, 52.0], &[0.0], home_score, 0, 30);
        MatchSnapshot {
            match_id: match_id.to_string(),
            home_team: "Home".into(),
            away_team: "Away".into(),
            timestamp: Utc::now(),
            minute: Some(60),
            status: MatchStatus::InProgress,
            home_score,
            away_score: 0,
            match_state: MatchState::Balanced,
            sample_size: 12,
            analysis,
        }
    }

    fn db() -> Database {
        Database::open(":memory:").unwrap()
    }

    #[test]
    fn migrations_are_idempotent() {
        let db = db();
        db.run_migrations().unwrap();
        assert!(db.list_snapshots().unwrap().is_empty());
    }

    #[test]
    fn snapshot_upsert_keeps_latest() {
        let db = db();
        db.save_snapshot(&sample_snapshot("1", 0)).unwrap();
        db.save_snapshot(&sample_snapshot("1", 2)).unwrap();
        db.save_snapshot(&sample_snapshot("2", 1)).unwrap();

        let latest = db.latest_snapshot("1").unwrap().unwrap();
        assert_eq!(latest.home_score, 2);
        assert_eq!(db.list_snapshots().unwrap().len(), 2);
        assert!(db.latest_snapshot("missing").unwrap().is_none());
    }

    #[test]
    fn stored_snapshot_round_trips_analysis() {
        let db = db();
        let snap = sample_snapshot("7", 1);
        db.save_snapshot(&snap).unwrap();
        let stored = db.latest_snapshot("7").unwrap().unwrap();
        assert_eq!(stored.timestamp, snap.timestamp);
        assert_eq!(stored.match_state, snap.match_state);
        assert_eq!(stored.analysis.trend_signal.description, snap.analysis.trend_signal.description);
        assert_eq!(stored.analysis.outcome.simulation_count, snap.analysis.outcome.simulation_count);
        approx::assert_relative_eq!(
            stored.analysis.outcome.probability_home_win,
            snap.analysis.outcome.probability_home_win,
            epsilon = 1e-12
        );
    }

    #[test]
    fn delete_snapshot_reports_existence() {
        let db = db();
        db.save_snapshot(&sample_snapshot("1", 0)).unwrap();
        assert!(db.delete_snapshot("1").unwrap());
        assert!(!db.delete_snapshot("1").unwrap());
        assert!(db.latest_snapshot("1").unwrap().is_none());
    }

    #[test]
    fn active_matches_are_replaced() {
        let db = db();
        db.save_active_matches(&["10".into(), "11".into()]).unwrap();
        assert_eq!(db.active_matches().unwrap(), vec!["10", "11"]);
        db.save_active_matches(&["12".into(), "12".into()]).unwrap();
        assert_eq!(db.active_matches().unwrap(), vec!["12"]);
        db.save_active_matches(&[]).unwrap();
        assert!(db.active_matches().unwrap().is_empty());
    }
}
