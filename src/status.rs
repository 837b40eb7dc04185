//! Status collection: the non-mutating view of workers, orphans, and summary
//! counts that C6 (readiness) and C7 (reconciler) both build on.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::locks::{self, Lock, LockStatus};
use crate::panes::{self, PaneSetCache};
use crate::process::ProcessRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Active,
    Stale,
}

#[derive(Debug, Clone)]
pub struct Worker {
    pub task_id: String,
    pub pane_id: String,
    pub window: String,
    pub agent: String,
    pub claimed_at: DateTime<Utc>,
    pub status: WorkerStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrphanType {
    StaleLock,
    UntrackedWorktree,
}

#[derive(Debug, Clone)]
pub struct Orphan {
    pub kind: OrphanType,
    pub task_id: Option<String>,
    pub path: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone)]
pub struct StatusSummary {
    pub tmux_running: bool,
    pub tmux_session: String,
    pub locks_count: u32,
    pub locks_active: u32,
    pub locks_stale: u32,
    pub worktrees_count: u32,
    pub worktrees_tracked: u32,
    pub worktrees_untracked: u32,
    pub config_exists: bool,
    pub orphans_count: u32,
}

#[derive(Debug, Clone)]
pub struct FullStatus {
    pub summary: StatusSummary,
    pub workers: Vec<Worker>,
    pub orphans: Vec<Orphan>,
}

pub fn collect_workers(
    locks_dir: &Path,
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    session_name: &str,
) -> Result<Vec<Worker>> {
    let parsed = locks::list_lock_files(locks_dir)?;
    let good: Vec<Lock> = parsed.into_iter().filter_map(std::result::Result::ok).collect();
    if good.is_empty() {
        return Ok(Vec::new());
    }
    let live_panes = panes.panes(runner, session_name, false)?;
    let statuses = locks::evaluate_locks(&good, &live_panes);

    Ok(good
        .into_iter()
        .map(|lock| {
            let status = match statuses.get(&lock.task_id) {
                Some(LockStatus::Active) => WorkerStatus::Active,
                _ => WorkerStatus::Stale,
            };
            Worker {
                task_id: lock.task_id,
                pane_id: lock.pane_id,
                window: lock.window_name,
                agent: lock.agent,
                claimed_at: lock.claimed_at,
                status,
            }
        })
        .collect())
}

fn worktree_task_ids(worktrees_dir: &Path) -> Result<Vec<String>> {
    if !worktrees_dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(worktrees_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir()
            && let Some(name) = entry.file_name().to_str()
        {
            ids.push(name.to_string());
        }
    }
    Ok(ids)
}

pub fn collect_orphans(locks_dir: &Path, worktrees_dir: &Path, workers: &[Worker]) -> Result<Vec<Orphan>> {
    let mut orphans = Vec::new();

    for worker in workers.iter().filter(|w| w.status == WorkerStatus::Stale) {
        orphans.push(Orphan {
            kind: OrphanType::StaleLock,
            task_id: Some(worker.task_id.clone()),
            path: locks::lock_path(locks_dir, &worker.task_id).display().to_string(),
            reason: "pane_not_found",
        });
    }

    let tracked: std::collections::HashSet<&str> = workers.iter().map(|w| w.task_id.as_str()).collect();
    for task_id in worktree_task_ids(worktrees_dir)? {
        if !tracked.contains(task_id.as_str()) {
            orphans.push(Orphan {
                kind: OrphanType::UntrackedWorktree,
                task_id: None,
                path: worktrees_dir.join(&task_id).display().to_string(),
                reason: "no_matching_lock",
            });
        }
    }

    Ok(orphans)
}

pub fn collect_summary(
    runner: &dyn ProcessRunner,
    session_name: &str,
    worktrees_dir: &Path,
    config_exists: bool,
    workers: &[Worker],
    orphans: &[Orphan],
) -> Result<StatusSummary> {
    let tmux_running = panes::session_exists(runner, session_name)?;
    let locks_count = workers.len() as u32;
    let locks_active = workers.iter().filter(|w| w.status == WorkerStatus::Active).count() as u32;
    let locks_stale = locks_count - locks_active;

    let tracked: std::collections::HashSet<&str> = workers.iter().map(|w| w.task_id.as_str()).collect();
    let worktree_ids = worktree_task_ids(worktrees_dir)?;
    let worktrees_count = worktree_ids.len() as u32;
    let worktrees_tracked = worktree_ids
        .iter()
        .filter(|id| tracked.contains(id.as_str()))
        .count() as u32;
    let worktrees_untracked = worktrees_count - worktrees_tracked;

    Ok(StatusSummary {
        tmux_running,
        tmux_session: session_name.to_string(),
        locks_count,
        locks_active,
        locks_stale,
        worktrees_count,
        worktrees_tracked,
        worktrees_untracked,
        config_exists,
        orphans_count: orphans.len() as u32,
    })
}

pub fn collect_full_status(
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    session_name: &str,
    locks_dir: &Path,
    worktrees_dir: &Path,
    config_exists: bool,
) -> Result<FullStatus> {
    let workers = collect_workers(locks_dir, runner, panes, session_name)?;
    let orphans = collect_orphans(locks_dir, worktrees_dir, &workers)?;
    let summary = collect_summary(runner, session_name, worktrees_dir, config_exists, &workers, &orphans)?;
    Ok(FullStatus { summary, workers, orphans })
}
