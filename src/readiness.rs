//! Readiness probe (C6): a decision tree over environment/runtime/work state
//! producing an overall verdict and a priority-ordered list of suggested
//! next actions. Non-mutating.

use std::path::Path;

use anyhow::Result;

use crate::panes::{self, PaneSetCache};
use crate::process::ProcessRunner;
use crate::ready_source;
use crate::status::{self, FullStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    NotReady,
    Ready,
    ReadyWithActions,
    ReadyNoWork,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkAvailable {
    Available,
    NotAvailable,
    Unknown,
}

#[derive(Debug, Clone)]
pub struct SuggestedAction {
    pub action: String,
    pub reason: String,
    pub blocking: bool,
}

#[derive(Debug, Clone)]
pub struct ReadyAssessment {
    pub overall: ReadyState,
    pub environment_ready: bool,
    pub runtime_ready: bool,
    pub work_available: WorkAvailable,
    pub orphans_count: u32,
    pub stale_locks_count: u32,
    pub untracked_worktrees_count: u32,
    pub active_workers_count: u32,
    pub ready_tasks_count: Option<u32>,
    pub suggested_actions: Vec<SuggestedAction>,
}

fn check_environment_ready(config_exists: bool) -> (bool, Option<&'static str>) {
    if !config_exists {
        return (false, Some("village runtime not initialized"));
    }
    (true, None)
}

fn check_runtime_ready(runner: &dyn ProcessRunner, session_name: &str) -> Result<(bool, Option<String>)> {
    if !panes::session_exists(runner, session_name)? {
        return Ok((false, Some(format!("tmux session '{session_name}' not running"))));
    }
    Ok((true, None))
}

fn check_work_available(
    runner: &dyn ProcessRunner,
    repo_root: &Path,
    default_agent: &str,
) -> (WorkAvailable, Option<u32>) {
    if !ready_source::ready_source_available(runner, repo_root) {
        return (WorkAvailable::Unknown, None);
    }
    let tasks = ready_source::list(runner, repo_root, default_agent);
    if tasks.is_empty() {
        (WorkAvailable::NotAvailable, None)
    } else {
        (WorkAvailable::Available, Some(tasks.len() as u32))
    }
}

/// Priority order: `up` (blocking) > `cleanup` (also blocking — orphans left
/// in place are treated as a precondition for progress) > `queue` >
/// `status --workers`.
fn generate_suggested_actions(
    environment_ready: bool,
    runtime_ready: bool,
    environment_error: Option<&str>,
    runtime_error: Option<&str>,
    work_available: WorkAvailable,
    ready_count: Option<u32>,
    orphans_count: u32,
    stale_locks_count: u32,
    untracked_worktrees_count: u32,
    active_workers: u32,
) -> Vec<SuggestedAction> {
    if !environment_ready {
        return vec![SuggestedAction {
            action: "village up".to_string(),
            reason: environment_error.unwrap_or("initialize village runtime").to_string(),
            blocking: true,
        }];
    }
    if !runtime_ready {
        return vec![SuggestedAction {
            action: "village up".to_string(),
            reason: runtime_error.map(str::to_string).unwrap_or_else(|| "initialize village runtime".to_string()),
            blocking: true,
        }];
    }

    let mut actions = Vec::new();

    if orphans_count > 0 {
        let mut parts = Vec::new();
        if stale_locks_count > 0 {
            parts.push(format!("{stale_locks_count} stale locks"));
        }
        if untracked_worktrees_count > 0 {
            parts.push(format!("{untracked_worktrees_count} untracked worktrees"));
        }
        actions.push(SuggestedAction {
            action: "village cleanup".to_string(),
            reason: format!("remove {}", parts.join(", ")),
            blocking: true,
        });
    }

    if work_available == WorkAvailable::Available
        && let Some(count) = ready_count
    {
        actions.push(SuggestedAction {
            action: format!("village queue --n {count}"),
            reason: format!("queue {count} ready tasks to workers"),
            blocking: false,
        });
    }

    if active_workers > 0 {
        actions.push(SuggestedAction {
            action: "village status --workers".to_string(),
            reason: format!("view {active_workers} active workers"),
            blocking: false,
        });
    }

    actions
}

pub fn assess_readiness(
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    repo_root: &Path,
    locks_dir: &Path,
    worktrees_dir: &Path,
    session_name: &str,
    default_agent: &str,
    config_exists: bool,
) -> Result<ReadyAssessment> {
    let (environment_ready, environment_error) = check_environment_ready(config_exists);
    let (runtime_ready, runtime_error) = check_runtime_ready(runner, session_name)?;
    let (work_available, ready_tasks_count) = check_work_available(runner, repo_root, default_agent);

    let full_status: FullStatus = status::collect_full_status(
        runner,
        panes,
        session_name,
        locks_dir,
        worktrees_dir,
        config_exists,
    )?;
    let orphans_count = full_status.summary.orphans_count;
    let stale_locks_count = full_status
        .orphans
        .iter()
        .filter(|o| o.kind == status::OrphanType::StaleLock)
        .count() as u32;
    let untracked_worktrees_count = full_status
        .orphans
        .iter()
        .filter(|o| o.kind == status::OrphanType::UntrackedWorktree)
        .count() as u32;
    let active_workers_count = full_status.summary.locks_active;

    let suggested_actions = generate_suggested_actions(
        environment_ready,
        runtime_ready,
        environment_error,
        runtime_error.as_deref(),
        work_available,
        ready_tasks_count,
        orphans_count,
        stale_locks_count,
        untracked_worktrees_count,
        active_workers_count,
    );

    let overall = if !environment_ready || !runtime_ready {
        ReadyState::NotReady
    } else if work_available == WorkAvailable::Available {
        if orphans_count > 0 {
            ReadyState::ReadyWithActions
        } else {
            ReadyState::Ready
        }
    } else if work_available == WorkAvailable::NotAvailable {
        ReadyState::ReadyNoWork
    } else if orphans_count > 0 {
        ReadyState::ReadyWithActions
    } else {
        ReadyState::Unknown
    };

    Ok(ReadyAssessment {
        overall,
        environment_ready,
        runtime_ready,
        work_available,
        orphans_count,
        stale_locks_count,
        untracked_worktrees_count,
        active_workers_count,
        ready_tasks_count,
        suggested_actions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessRunner;

    #[test]
    fn not_ready_when_environment_missing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeProcessRunner::new();
        let panes = PaneSetCache::new();
        let assessment = assess_readiness(
            &runner,
            &panes,
            dir.path(),
            &dir.path().join("locks"),
            &dir.path().join("worktrees"),
            "village",
            "worker",
            false,
        )
        .unwrap();
        assert_eq!(assessment.overall, ReadyState::NotReady);
        assert!(assessment.suggested_actions[0].blocking);
        assert_eq!(assessment.suggested_actions[0].action, "village up");
    }

    #[test]
    fn not_ready_when_session_missing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeProcessRunner::new();
        runner.script(&["tmux", "has-session"], Some(1), "", "");
        let panes = PaneSetCache::new();
        let assessment = assess_readiness(
            &runner,
            &panes,
            dir.path(),
            &dir.path().join("locks"),
            &dir.path().join("worktrees"),
            "village",
            "worker",
            true,
        )
        .unwrap();
        assert_eq!(assessment.overall, ReadyState::NotReady);
    }

    #[test]
    fn ready_no_work_when_beads_has_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".beads")).unwrap();
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(&["which", "bd"], "/usr/bin/bd");
        runner.script_ok(&["bd", "ready"], "");
        let panes = PaneSetCache::new();
        let assessment = assess_readiness(
            &runner,
            &panes,
            dir.path(),
            &dir.path().join("locks"),
            &dir.path().join("worktrees"),
            "village",
            "worker",
            true,
        )
        .unwrap();
        assert_eq!(assessment.overall, ReadyState::ReadyNoWork);
        assert!(assessment.suggested_actions.is_empty());
    }

    #[test]
    fn ready_with_actions_suggests_cleanup_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        std::fs::create_dir_all(&locks_dir).unwrap();
        crate::locks::write_lock(
            &locks_dir,
            &crate::locks::Lock {
                task_id: "a".to_string(),
                pane_id: "%1".to_string(),
                window_name: "w".to_string(),
                agent: "build".to_string(),
                claimed_at: chrono::Utc::now(),
                state: None,
                state_history: Vec::new(),
            },
        )
        .unwrap();

        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script(&["which", "bd"], Some(1), "", "");
        let panes = PaneSetCache::new();

        let assessment = assess_readiness(
            &runner,
            &panes,
            dir.path(),
            &locks_dir,
            &dir.path().join("worktrees"),
            "village",
            "worker",
            true,
        )
        .unwrap();
        assert_eq!(assessment.overall, ReadyState::ReadyWithActions);
        let cleanup = assessment
            .suggested_actions
            .iter()
            .find(|a| a.action == "village cleanup")
            .unwrap();
        assert!(cleanup.blocking);
    }
}
