//! Reconciler (C7): plan/apply removal of stale locks, corrupted locks,
//! orphan worktrees, and stale worktrees. Removal order is fixed: stale
//! locks, then corrupted locks, then orphan worktrees, then stale worktrees.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::events;
use crate::locks::{self, CorruptedLock, Lock};
use crate::panes::PaneSetCache;
use crate::process::ProcessRunner;
use crate::scm::Scm;
use crate::worktrees;

#[derive(Debug, Clone, Default)]
pub struct CleanupPlan {
    pub stale_locks: Vec<Lock>,
    pub corrupted_locks: Vec<CorruptedLock>,
    pub orphan_worktrees: Vec<PathBuf>,
    pub stale_worktrees: Vec<PathBuf>,
}

fn worktree_dirs(worktrees_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !worktrees_dir.exists() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(worktrees_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            dirs.push((name.to_string(), entry.path()));
        }
    }
    Ok(dirs)
}

/// `apply` controls whether orphan/stale worktrees are included; stale and
/// corrupted locks are always planned, and both are eligible for removal
/// once `execute_cleanup` runs.
pub fn plan_cleanup(
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    locks_dir: &Path,
    worktrees_dir: &Path,
    session_name: &str,
    apply: bool,
) -> Result<CleanupPlan> {
    let live_panes = panes.refresh_panes(runner, session_name)?;
    let parsed = locks::list_lock_files(locks_dir)?;

    let mut good_locks = Vec::new();
    let mut corrupted_locks = Vec::new();
    for result in parsed {
        match result {
            Ok(lock) => good_locks.push(lock),
            Err(corrupted) => corrupted_locks.push(corrupted),
        }
    }

    let stale_locks: Vec<Lock> = good_locks
        .iter()
        .filter(|lock| !locks::is_active(lock, &live_panes))
        .cloned()
        .collect();

    let mut orphan_worktrees = Vec::new();
    let mut stale_worktrees = Vec::new();

    if apply {
        let active_task_ids: HashSet<String> = good_locks
            .iter()
            .filter(|lock| locks::is_active(lock, &live_panes))
            .map(|lock| lock.task_id.clone())
            .collect();

        for (task_id, path) in worktree_dirs(worktrees_dir)? {
            if !active_task_ids.contains(&task_id) && !stale_locks.iter().any(|l| l.task_id == task_id) {
                orphan_worktrees.push(path);
            }
        }

        for lock in &stale_locks {
            let path = worktrees_dir.join(&lock.task_id);
            if path.exists() && !active_task_ids.contains(&lock.task_id) {
                stale_worktrees.push(path);
            }
        }
    }

    Ok(CleanupPlan {
        stale_locks,
        corrupted_locks,
        orphan_worktrees,
        stale_worktrees,
    })
}

pub fn execute_cleanup(
    plan: &CleanupPlan,
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    repo_root: &Path,
    locks_dir: &Path,
    worktrees_dir: &Path,
    event_log_path: &Path,
) -> Result<()> {
    for lock in &plan.stale_locks {
        locks::remove_lock(locks_dir, &lock.task_id)?;
        events::log_ok(event_log_path, "cleanup", Some(&lock.task_id), Some(&lock.pane_id))?;
    }

    for corrupted in &plan.corrupted_locks {
        std::fs::remove_file(&corrupted.path)
            .with_context(|| format!("failed to remove corrupted lock {}", corrupted.path.display()))?;
        let task_id = corrupted.path.file_stem().and_then(|s| s.to_str());
        events::log_ok(event_log_path, "cleanup", task_id, None)?;
    }

    for path in plan.orphan_worktrees.iter().chain(plan.stale_worktrees.iter()) {
        let Some(task_id) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        worktrees::delete_worktree(scm, runner, repo_root, worktrees_dir, task_id)?;
        events::log_ok(event_log_path, "cleanup", Some(task_id), None)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessRunner;
    use crate::scm::GitScm;

    fn sample_lock(task_id: &str, pane: &str) -> Lock {
        Lock {
            task_id: task_id.to_string(),
            pane_id: pane.to_string(),
            window_name: format!("worker-{task_id}"),
            agent: "build".to_string(),
            claimed_at: chrono::Utc::now(),
            state: None,
            state_history: Vec::new(),
        }
    }

    #[test]
    fn plan_finds_stale_locks_but_not_worktrees_without_apply() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        std::fs::create_dir_all(&locks_dir).unwrap();
        std::fs::create_dir_all(worktrees_dir.join("a")).unwrap();
        locks::write_lock(&locks_dir, &sample_lock("a", "%1")).unwrap();

        let runner = FakeProcessRunner::new();
        runner.script(&["tmux", "has-session"], Some(1), "", "");
        let panes = PaneSetCache::new();

        let plan = plan_cleanup(&runner, &panes, &locks_dir, &worktrees_dir, "village", false).unwrap();
        assert_eq!(plan.stale_locks.len(), 1);
        assert!(plan.orphan_worktrees.is_empty());
        assert!(plan.stale_worktrees.is_empty());
    }

    #[test]
    fn plan_includes_orphan_and_stale_worktrees_with_apply() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        std::fs::create_dir_all(&locks_dir).unwrap();
        std::fs::create_dir_all(worktrees_dir.join("a")).unwrap();
        std::fs::create_dir_all(worktrees_dir.join("orphan")).unwrap();
        locks::write_lock(&locks_dir, &sample_lock("a", "%1")).unwrap();

        let runner = FakeProcessRunner::new();
        runner.script(&["tmux", "has-session"], Some(1), "", "");
        let panes = PaneSetCache::new();

        let plan = plan_cleanup(&runner, &panes, &locks_dir, &worktrees_dir, "village", true).unwrap();
        assert_eq!(plan.stale_worktrees.len(), 1);
        assert_eq!(plan.orphan_worktrees.len(), 1);
        assert_eq!(plan.orphan_worktrees[0].file_name().unwrap(), "orphan");
    }

    #[test]
    fn plan_surfaces_corrupted_locks_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        std::fs::create_dir_all(&locks_dir).unwrap();
        std::fs::write(locks_dir.join("bad.lock"), "not a valid lock\n").unwrap();

        let runner = FakeProcessRunner::new();
        runner.script(&["tmux", "has-session"], Some(1), "", "");
        let panes = PaneSetCache::new();

        let plan = plan_cleanup(&runner, &panes, &locks_dir, &dir.path().join("worktrees"), "village", false).unwrap();
        assert_eq!(plan.corrupted_locks.len(), 1);
        assert!(locks_dir.join("bad.lock").exists());
    }

    #[test]
    fn execute_cleanup_removes_corrupted_lock_and_logs_event() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        std::fs::create_dir_all(&locks_dir).unwrap();
        let bad_path = locks_dir.join("bad.lock");
        std::fs::write(&bad_path, "not a valid lock\n").unwrap();

        let plan = CleanupPlan {
            corrupted_locks: vec![CorruptedLock {
                path: bad_path.clone(),
                reason: "missing task_id".to_string(),
            }],
            ..Default::default()
        };

        let runner = FakeProcessRunner::new();
        let event_log = dir.path().join("events.log");
        execute_cleanup(&plan, &GitScm, &runner, dir.path(), &locks_dir, &worktrees_dir, &event_log).unwrap();

        assert!(!bad_path.exists());
        let events = events::read_events(&event_log).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id.as_deref(), Some("bad"));
        assert_eq!(events[0].result.as_deref(), Some("ok"));
    }

    #[test]
    fn execute_cleanup_removes_stale_lock_and_logs_event() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        std::fs::create_dir_all(&locks_dir).unwrap();
        locks::write_lock(&locks_dir, &sample_lock("a", "%1")).unwrap();

        let plan = CleanupPlan {
            stale_locks: vec![sample_lock("a", "%1")],
            ..Default::default()
        };

        let runner = FakeProcessRunner::new();
        let event_log = dir.path().join("events.log");
        execute_cleanup(&plan, &GitScm, &runner, dir.path(), &locks_dir, &worktrees_dir, &event_log).unwrap();

        assert!(!locks_dir.join("a.lock").exists());
        let events = events::read_events(&event_log).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].result.as_deref(), Some("ok"));
    }
}
