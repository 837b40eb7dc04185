//! Text renderer: column-aligned tables and human-readable summaries.

use crate::queue::QueuePlan;
use crate::readiness::{ReadyAssessment, ReadyState, SuggestedAction, WorkAvailable};
use crate::status::{FullStatus, Orphan, OrphanType, StatusSummary, Worker, WorkerStatus};

use super::style_status;

fn worker_status_label(status: WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Active => "ACTIVE",
        WorkerStatus::Stale => "STALE",
    }
}

pub fn render_worker_table(workers: &[Worker]) -> String {
    if workers.is_empty() {
        return "No workers found".to_string();
    }

    let headers = ["TASK_ID", "STATUS", "PANE", "AGENT", "WINDOW", "CLAIMED_AT"];
    let rows: Vec<[String; 6]> = workers
        .iter()
        .map(|w| {
            [
                w.task_id.clone(),
                worker_status_label(w.status).to_string(),
                w.pane_id.clone(),
                w.agent.clone(),
                w.window.clone(),
                w.claimed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let pad = |s: &str, w: usize| format!("{s:<w$}");
    let mut lines = Vec::new();
    lines.push(
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| pad(h, widths[i]))
            .collect::<Vec<_>>()
            .join("  "),
    );
    lines.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
    for row in &rows {
        let rendered: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if i == 1 {
                    pad(&style_status(cell).to_string(), widths[i])
                } else {
                    pad(cell, widths[i])
                }
            })
            .collect();
        lines.push(rendered.join("  "));
    }
    lines.join("\n")
}

pub fn render_orphans_grouped(orphans: &[Orphan]) -> String {
    if orphans.is_empty() {
        return "No orphans found".to_string();
    }

    let stale_locks: Vec<&Orphan> = orphans.iter().filter(|o| o.kind == OrphanType::StaleLock).collect();
    let untracked: Vec<&Orphan> = orphans
        .iter()
        .filter(|o| o.kind == OrphanType::UntrackedWorktree)
        .collect();

    let mut lines = vec![format!("ORPHANS ({}):", orphans.len()), String::new()];

    if !stale_locks.is_empty() {
        lines.push(format!("  STALE LOCKS ({}):", stale_locks.len()));
        for orphan in &stale_locks {
            let task_id = orphan.task_id.as_deref().unwrap_or("unknown");
            lines.push(format!("    {task_id}"));
        }
        lines.push(String::new());
    }

    if !untracked.is_empty() {
        lines.push(format!("  UNTRACKED WORKTREES ({}):", untracked.len()));
        for orphan in &untracked {
            lines.push(format!("    {}", orphan.path));
        }
        lines.push(String::new());
    }

    lines.push("  SUGGESTED ACTIONS:".to_string());
    if !stale_locks.is_empty() {
        lines.push("    - village cleanup (remove stale locks)".to_string());
    }
    if !untracked.is_empty() {
        lines.push("    - village cleanup --apply (remove untracked worktrees)".to_string());
    }

    lines.join("\n")
}

pub fn render_summary(summary: &StatusSummary) -> String {
    let mut lines = vec![
        format!(
            "TMUX session: {} {}",
            summary.tmux_session,
            if summary.tmux_running { "running" } else { "not running" }
        ),
        format!(
            "Lock files: {} ({} ACTIVE, {} STALE)",
            summary.locks_count, summary.locks_active, summary.locks_stale
        ),
        format!(
            "Worktrees: {} ({} tracked, {} untracked)",
            summary.worktrees_count, summary.worktrees_tracked, summary.worktrees_untracked
        ),
        format!("Config file: {}", if summary.config_exists { "exists" } else { "not created" }),
    ];

    if summary.orphans_count > 0 {
        lines.push(String::new());
        lines.push("WARNING: orphans detected (use --orphans for details)".to_string());
    }

    lines.push(String::new());
    lines.push("Use --workers or --orphans for details.".to_string());
    lines.join("\n")
}

pub fn render_full_status(status: &FullStatus, show_workers: bool, show_orphans: bool) -> String {
    if !show_workers && !show_orphans {
        return render_summary(&status.summary);
    }

    let mut lines = vec![render_summary(&status.summary), String::new()];
    if show_workers {
        lines.push(render_worker_table(&status.workers));
        lines.push(String::new());
    }
    if show_orphans {
        lines.push(render_orphans_grouped(&status.orphans));
    }
    lines.join("\n")
}

pub fn render_suggested_actions(actions: &[SuggestedAction]) -> String {
    if actions.is_empty() {
        return "SUGGESTED ACTIONS:\n  None (everything looks good)".to_string();
    }
    let mut lines = vec!["SUGGESTED ACTIONS:".to_string(), String::new()];
    for (i, action) in actions.iter().enumerate() {
        let prefix = if action.blocking {
            format!("  {}. [BLOCKING]", i + 1)
        } else {
            format!("  {}.", i + 1)
        };
        lines.push(format!("{prefix} {}", action.action));
        lines.push(format!("     Reason: {}", action.reason));
    }
    lines.join("\n")
}

fn state_label(state: ReadyState) -> &'static str {
    match state {
        ReadyState::NotReady => "NOT READY",
        ReadyState::Ready => "READY",
        ReadyState::ReadyWithActions => "READY WITH ACTIONS",
        ReadyState::ReadyNoWork => "READY NO WORK",
        ReadyState::Unknown => "UNKNOWN",
    }
}

pub fn render_ready_text(assessment: &ReadyAssessment) -> String {
    let mut lines = vec![format!("OVERALL STATUS: {}", state_label(assessment.overall)), String::new()];

    lines.push(if assessment.environment_ready {
        "Environment Check:   ok (village runtime initialized)".to_string()
    } else {
        "Environment Check:   missing (village runtime not initialized)".to_string()
    });

    lines.push(if assessment.runtime_ready {
        "Runtime Check:       ok (tmux session running)".to_string()
    } else {
        "Runtime Check:       missing (tmux session not running)".to_string()
    });

    lines.push(match assessment.work_available {
        WorkAvailable::Available => format!(
            "Work Available:      yes ({} ready tasks)",
            assessment.ready_tasks_count.unwrap_or(0)
        ),
        WorkAvailable::NotAvailable => "Work Available:      no ready tasks".to_string(),
        WorkAvailable::Unknown => "Work Available:      unknown".to_string(),
    });

    lines.push(String::new());
    lines.push(render_suggested_actions(&assessment.suggested_actions));
    lines.join("\n")
}

pub fn render_queue_plan(plan: &QueuePlan) -> String {
    let mut lines = vec![
        format!("Ready tasks: {}", plan.ready_tasks.len()),
        format!("Available tasks: {}", plan.available_tasks.len()),
        format!("Blocked tasks: {}", plan.blocked_tasks.len()),
        format!("Slots available: {}", plan.slots_available),
        format!("Active workers: {}", plan.workers_count),
        format!("Concurrency limit: {}", plan.concurrency_limit),
        String::new(),
    ];

    if plan.available_tasks.is_empty() {
        lines.push("No tasks available to start".to_string());
    } else {
        lines.push("Available tasks (will start):".to_string());
        for task in &plan.available_tasks {
            lines.push(format!("  - {} (agent: {})", task.task_id, task.agent));
        }
    }

    if !plan.blocked_tasks.is_empty() {
        lines.push(String::new());
        lines.push("Blocked tasks:".to_string());
        for task in &plan.blocked_tasks {
            lines.push(format!(
                "  - {} (agent: {}) - {}",
                task.task_id,
                task.agent,
                task.skip_reason.unwrap_or("unknown")
            ));
        }
    }

    lines.join("\n")
}
