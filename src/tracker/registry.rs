use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::db::models::MatchObservation;

#[derive(Debug, Default)]
struct MatchSlot {
    history: Vec<MatchObservation>,
    running: bool,
}

/// Per-match event histories for the currently tracked matches.
///
/// Cloning is cheap and every clone shares the same state. The analysis
/// core never sees the lock: it works on a cloned history.
#[derive(Debug, Clone, Default)]
pub struct MatchRegistry {
    slots: Arc<Mutex<HashMap<String, MatchSlot>>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, MatchSlot>> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the tracked set. Histories of matches that stay selected are
    /// kept; deselected ones are dropped. Returns the number tracked.
    pub fn select(&self, match_ids: &[String]) -> usize {
        let mut slots = self.slots();
        slots.retain(|id, _| match_ids.contains(id));
        for id in match_ids {
            slots.entry(id.clone()).or_default();
        }
        slots.len()
    }

    /// Stop tracking one match; returns whether it was tracked.
    pub fn untrack(&self, match_id: &str) -> bool {
        self.slots().remove(match_id).is_some()
    }

    /// Append an observation to its match's history. Observations for
    /// untracked matches are ignored and `false` is returned.
    pub fn record(&self, observation: MatchObservation) -> bool {
        match self.slots().get_mut(&observation.match_id) {
            Some(slot) => {
                slot.history.push(observation);
                true
            }
            None => false,
        }
    }

    /// Clone of a match's history, in arrival order.
    pub fn snapshot(&self, match_id: &str) -> Option<Vec<MatchObservation>> {
        self.slots().get(match_id).map(|s| s.history.clone())
    }

    pub fn history_len(&self, match_id: &str) -> Option<usize> {
        self.slots().get(match_id).map(|s| s.history.len())
    }

    /// Tracked match IDs, sorted.
    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_tracked(&self, match_id: &str) -> bool {
        self.slots().contains_key(match_id)
    }

    /// Mark a match as being analysed. Returns `None` when it is untracked or
    /// a previous run has not finished yet.
    pub fn try_begin_run(&self, match_id: &str) -> Option<RunGuard> {
        let mut slots = self.slots();
        let slot = slots.get_mut(match_id)?;
        if slot.running {
            return None;
        }
        slot.running = true;
        Some(RunGuard {
            registry: self.clone(),
            match_id: match_id.to_string(),
        })
    }

    fn finish_run(&self, match_id: &str) {
        if let Some(slot) = self.slots().get_mut(match_id) {
            slot.running = false;
        }
    }
}

/// Clears the in-flight flag of a match when dropped.
#[derive(Debug)]
pub struct RunGuard {
    registry: MatchRegistry,
    match_id: String,
}

impl RunGuard {
    pub fn match_id(&self) -> &str {
        &self.match_id
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.finish_run(&self.match_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::tests::observation;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn record_only_accepts_tracked_matches() {
        let reg = MatchRegistry::new();
        assert!(!reg.record(observation("1", 10, 0, 0, Some(50.0))));
        reg.select(&ids(&["1"]));
        assert!(reg.record(observation("1", 10, 0, 0, Some(50.0))));
        assert!(reg.record(observation("1", 11, 1, 0, Some(52.0))));

        let hist = reg.snapshot("1").unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[1].home_score, 1);
        assert!(reg.snapshot("2").is_none());
    }

    #[test]
    fn select_keeps_surviving_histories() {
        let reg = MatchRegistry::new();
        reg.select(&ids(&["1", "2"]));
        reg.record(observation("1", 5, 0, 0, None));
        reg.record(observation("2", 5, 0, 0, None));

        assert_eq!(reg.select(&ids(&["2", "3"])), 2);
        assert_eq!(reg.tracked_ids(), ids(&["2", "3"]));
        assert_eq!(reg.history_len("2"), Some(1));
        assert_eq!(reg.history_len("3"), Some(0));
        assert!(!reg.is_tracked("1"));
    }

    #[test]
    fn snapshot_is_detached_from_later_records() {
        let reg = MatchRegistry::new();
        reg.select(&ids(&["1"]));
        reg.record(observation("1", 1, 0, 0, None));
        let before = reg.snapshot("1").unwrap();
        reg.record(observation("1", 2, 0, 0, None));
        assert_eq!(before.len(), 1);
        assert_eq!(reg.history_len("1"), Some(2));
    }

    #[test]
    fn at_most_one_run_per_match() {
        let reg = MatchRegistry::new();
        reg.select(&ids(&["1", "2"]));

        let guard = reg.try_begin_run("1").unwrap();
        assert_eq!(guard.match_id(), "1");
        assert!(reg.try_begin_run("1").is_none());
        let other = reg.try_begin_run("2");
        assert!(other.is_some());

        drop(guard);
        assert!(reg.try_begin_run("1").is_some());
        assert!(reg.try_begin_run("missing").is_none());
    }

    #[test]
    fn untrack_during_run_is_harmless() {
        let reg = MatchRegistry::new();
        reg.select(&ids(&["1"]));
        let guard = reg.try_begin_run("1").unwrap();
        assert!(reg.untrack("1"));
        assert!(!reg.untrack("1"));
        drop(guard);
        assert!(!reg.is_tracked("1"));
    }

    #[test]
    fn clones_share_state_across_threads() {
        let reg = MatchRegistry::new();
        reg.select(&ids(&["1"]));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        reg.record(observation("1", t * 25 + i, 0, 0, None));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.history_len("1"), Some(100));
    }
}
