//! Pane set probe (C2): which pane IDs currently exist in a multiplexer
//! session, backed by a short-TTL cache. This is the one sanctioned
//! process-local singleton (§9) — everything else threads state explicitly.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::process::ProcessRunner;

/// Matches the reference implementation's `_CACHE_TTL = 5.0`.
pub const CACHE_TTL: Duration = Duration::from_secs(5);

struct Snapshot {
    panes: HashSet<String>,
    fetched_at: Instant,
}

/// Cached pane-set snapshots, keyed by session name. Construct one per
/// process (owned by [`crate::world::World`]); `clear_cache` at the start of
/// every CLI invocation per §4.2.
#[derive(Default)]
pub struct PaneSetCache {
    snapshots: std::sync::Mutex<HashMap<String, Snapshot>>,
}

impl PaneSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pane set for `session`. Within `CACHE_TTL` of the last
    /// fetch, returns the cached set unless `force_refresh` is set.
    pub fn panes(
        &self,
        runner: &dyn ProcessRunner,
        session: &str,
        force_refresh: bool,
    ) -> Result<HashSet<String>> {
        {
            let snapshots = self.snapshots.lock().unwrap();
            if !force_refresh
                && let Some(snap) = snapshots.get(session)
                && snap.fetched_at.elapsed() < CACHE_TTL
            {
                return Ok(snap.panes.clone());
            }
        }
        self.refresh_panes(runner, session)
    }

    /// Unconditional re-query; used after a mutation (pane created/killed).
    pub fn refresh_panes(&self, runner: &dyn ProcessRunner, session: &str) -> Result<HashSet<String>> {
        let panes = if session_exists(runner, session)? {
            list_panes(runner, session)?
        } else {
            HashSet::new()
        };
        self.snapshots.lock().unwrap().insert(
            session.to_string(),
            Snapshot {
                panes: panes.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(panes)
    }

    /// Drop all cached sets. Called at process start of every CLI invocation.
    pub fn clear_cache(&self) {
        self.snapshots.lock().unwrap().clear();
    }
}

/// Whether the multiplexer reports a session by this name. Not an error if
/// absent — callers distinguish "no session" from "session, but empty".
pub fn session_exists(runner: &dyn ProcessRunner, session: &str) -> Result<bool> {
    let output = runner.run(&["tmux", "has-session", "-t", session], None)?;
    Ok(output.success())
}

fn list_panes(runner: &dyn ProcessRunner, session: &str) -> Result<HashSet<String>> {
    let out = runner.run_output(
        &["tmux", "list-panes", "-t", session, "-F", "#{pane_id}"],
        None,
    )?;
    Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessRunner;

    #[test]
    fn panes_returns_empty_set_when_session_missing() {
        let runner = FakeProcessRunner::new();
        runner.script(&["tmux", "has-session"], Some(1), "", "");
        let cache = PaneSetCache::new();
        let panes = cache.panes(&runner, "village", false).unwrap();
        assert!(panes.is_empty());
    }

    #[test]
    fn panes_lists_session_panes() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(&["tmux", "list-panes"], "%1\n%2\n%3\n");
        let cache = PaneSetCache::new();
        let panes = cache.panes(&runner, "village", false).unwrap();
        assert_eq!(panes.len(), 3);
        assert!(panes.contains("%2"));
    }

    #[test]
    fn panes_are_cached_within_ttl() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(&["tmux", "list-panes"], "%1\n");
        let cache = PaneSetCache::new();
        cache.panes(&runner, "village", false).unwrap();
        cache.panes(&runner, "village", false).unwrap();
        // has-session + list-panes called once each, not twice.
        assert_eq!(runner.call_count(), 2);
    }

    #[test]
    fn force_refresh_bypasses_cache() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(&["tmux", "list-panes"], "%1\n");
        let cache = PaneSetCache::new();
        cache.panes(&runner, "village", false).unwrap();
        cache.panes(&runner, "village", true).unwrap();
        assert_eq!(runner.call_count(), 4);
    }

    #[test]
    fn clear_cache_forces_next_lookup_to_requery() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(&["tmux", "list-panes"], "%1\n");
        let cache = PaneSetCache::new();
        cache.panes(&runner, "village", false).unwrap();
        cache.clear_cache();
        cache.panes(&runner, "village", false).unwrap();
        assert_eq!(runner.call_count(), 4);
    }
}
