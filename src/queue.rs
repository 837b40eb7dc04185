//! Queue scheduler (C8): turn a list of ready tasks into an admission plan
//! by applying, in order, dedup against recent events, the active-lock
//! check, then the concurrency limit (Q1-Q5, §4.8/§8).

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;

use crate::events;
use crate::locks::{self, Lock, LockStatus};
use crate::panes::PaneSetCache;
use crate::process::ProcessRunner;
use crate::ready_source::{self, ReadyTask};

#[derive(Debug, Clone)]
pub struct QueueTask {
    pub task_id: String,
    pub agent: String,
    pub skip_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct QueuePlan {
    pub ready_tasks: Vec<QueueTask>,
    pub available_tasks: Vec<QueueTask>,
    pub blocked_tasks: Vec<QueueTask>,
    pub slots_available: u32,
    pub workers_count: u32,
    pub concurrency_limit: u32,
}

/// Active (not stale) workers' task ids, derived from the lock registry
/// against the current pane set.
fn active_worker_task_ids(
    locks_dir: &Path,
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    session_name: &str,
) -> Result<(HashSet<String>, u32)> {
    let parsed = locks::list_lock_files(locks_dir)?;
    let good: Vec<Lock> = parsed.into_iter().filter_map(std::result::Result::ok).collect();
    if good.is_empty() {
        return Ok((HashSet::new(), 0));
    }
    let live_panes = panes.panes(runner, session_name, false)?;
    let statuses = locks::evaluate_locks(&good, &live_panes);
    let active: HashSet<String> = good
        .iter()
        .filter(|lock| statuses.get(&lock.task_id) == Some(&LockStatus::Active))
        .map(|lock| lock.task_id.clone())
        .collect();
    let count = active.len() as u32;
    Ok((active, count))
}

/// (Q1-Q5) Intake order is fixed: dedup first, then active-lock, then the
/// concurrency limit. A task blocked for one reason is never re-evaluated
/// against a later check.
pub fn arbitrate_locks(
    tasks: Vec<ReadyTask>,
    locks_dir: &Path,
    event_log_path: &Path,
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    session_name: &str,
    max_workers: u32,
    queue_ttl_minutes: u32,
    force: bool,
) -> Result<QueuePlan> {
    let (active_task_ids, workers_count) =
        active_worker_task_ids(locks_dir, runner, panes, session_name)?;
    let slots_available = max_workers.saturating_sub(workers_count);

    let recent_events = if force {
        Vec::new()
    } else {
        events::read_events(event_log_path)?
    };

    let mut available_tasks = Vec::new();
    let mut blocked_tasks = Vec::new();
    let ready_tasks: Vec<QueueTask> = tasks
        .iter()
        .map(|t| QueueTask {
            task_id: t.task_id.clone(),
            agent: t.agent.clone(),
            skip_reason: None,
        })
        .collect();

    for task in ready_tasks {
        let mut task = task;

        if !force {
            let (recent, _) = events::is_task_recent(&recent_events, &task.task_id, queue_ttl_minutes);
            if recent {
                task.skip_reason = Some("recently_executed");
                blocked_tasks.push(task);
                continue;
            }
        }

        if active_task_ids.contains(&task.task_id) {
            task.skip_reason = Some("active_lock");
            blocked_tasks.push(task);
            continue;
        }

        if available_tasks.len() as u32 >= slots_available {
            task.skip_reason = Some("concurrency_limit");
            blocked_tasks.push(task);
            continue;
        }

        available_tasks.push(task);
    }

    Ok(QueuePlan {
        ready_tasks: tasks
            .into_iter()
            .map(|t| QueueTask {
                task_id: t.task_id,
                agent: t.agent,
                skip_reason: None,
            })
            .collect(),
        available_tasks,
        blocked_tasks,
        slots_available,
        workers_count,
        concurrency_limit: max_workers,
    })
}

pub fn generate_queue_plan(
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    repo_root: &Path,
    locks_dir: &Path,
    event_log_path: &Path,
    session_name: &str,
    default_agent: &str,
    max_workers: u32,
    queue_ttl_minutes: u32,
    force: bool,
) -> Result<QueuePlan> {
    let tasks = ready_source::list(runner, repo_root, default_agent);
    arbitrate_locks(
        tasks,
        locks_dir,
        event_log_path,
        runner,
        panes,
        session_name,
        max_workers,
        queue_ttl_minutes,
        force,
    )
}
