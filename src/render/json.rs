//! JSON renderer: stable schema, versioned, sorted keys. Never emits
//! suggested actions — those are a text-mode-only convenience.

use serde::Serialize;
use serde_json::{json, Value};

use crate::locks::TaskState;
use crate::queue::QueuePlan;
use crate::status::{FullStatus, OrphanType, WorkerStatus};

pub const JSON_VERSION: u32 = 1;

fn envelope(command: &str, body: Value) -> String {
    let mut map = serde_json::Map::new();
    map.insert("command".to_string(), json!(command));
    map.insert("version".to_string(), json!(JSON_VERSION));
    if let Value::Object(fields) = body {
        map.extend(fields);
    }
    serde_json::to_string(&sort_value(Value::Object(map))).unwrap_or_default()
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(String, Value)> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_value).collect()),
        other => other,
    }
}

pub fn render_status_json(status: &FullStatus) -> String {
    let workers: Vec<Value> = status
        .workers
        .iter()
        .map(|w| {
            json!({
                "task_id": w.task_id,
                "pane_id": w.pane_id,
                "window": w.window,
                "agent": w.agent,
                "claimed_at": w.claimed_at.to_rfc3339(),
                "status": if w.status == WorkerStatus::Active { "ACTIVE" } else { "STALE" },
            })
        })
        .collect();

    let orphans: Vec<Value> = status
        .orphans
        .iter()
        .map(|o| {
            json!({
                "type": if o.kind == OrphanType::StaleLock { "STALE_LOCK" } else { "UNTRACKED_WORKTREE" },
                "task_id": o.task_id,
                "path": o.path,
                "reason": o.reason,
            })
        })
        .collect();

    envelope(
        "status",
        json!({
            "summary": {
                "tmux_running": status.summary.tmux_running,
                "tmux_session": status.summary.tmux_session,
                "locks_count": status.summary.locks_count,
                "locks_active": status.summary.locks_active,
                "locks_stale": status.summary.locks_stale,
                "worktrees_count": status.summary.worktrees_count,
                "worktrees_tracked": status.summary.worktrees_tracked,
                "worktrees_untracked": status.summary.worktrees_untracked,
                "config_exists": status.summary.config_exists,
                "orphans_count": status.summary.orphans_count,
            },
            "workers": workers,
            "orphans": orphans,
        }),
    )
}

pub fn render_queue_plan_json(plan: &QueuePlan) -> String {
    let to_vec = |tasks: &[crate::queue::QueueTask]| -> Vec<Value> {
        tasks
            .iter()
            .map(|t| json!({"task_id": t.task_id, "agent": t.agent, "skip_reason": t.skip_reason}))
            .collect()
    };
    envelope(
        "queue",
        json!({
            "ready_tasks": to_vec(&plan.ready_tasks),
            "available_tasks": to_vec(&plan.available_tasks),
            "blocked_tasks": to_vec(&plan.blocked_tasks),
            "slots_available": plan.slots_available,
            "workers_count": plan.workers_count,
            "concurrency_limit": plan.concurrency_limit,
        }),
    )
}

pub fn render_ready_json(assessment: &crate::readiness::ReadyAssessment) -> String {
    use crate::readiness::{ReadyState, WorkAvailable};

    let overall = match assessment.overall {
        ReadyState::NotReady => "not_ready",
        ReadyState::Ready => "ready",
        ReadyState::ReadyWithActions => "ready_with_actions",
        ReadyState::ReadyNoWork => "ready_no_work",
        ReadyState::Unknown => "unknown",
    };
    let work_available = match assessment.work_available {
        WorkAvailable::Available => "available",
        WorkAvailable::NotAvailable => "not_available",
        WorkAvailable::Unknown => "unknown",
    };
    envelope(
        "ready",
        json!({
            "overall": overall,
            "environment_ready": assessment.environment_ready,
            "runtime_ready": assessment.runtime_ready,
            "work_available": work_available,
            "ready_tasks_count": assessment.ready_tasks_count,
            "orphans_count": assessment.orphans_count,
            "active_workers_count": assessment.active_workers_count,
        }),
    )
}

pub fn render_resume_json(result: &crate::resume::ResumeResult) -> String {
    envelope(
        "resume",
        json!({
            "success": result.success,
            "task_id": result.task_id,
            "agent": result.agent,
            "worktree_path": result.worktree_path.display().to_string(),
            "window_name": result.window_name,
            "pane_id": result.pane_id,
            "error": result.error,
        }),
    )
}

#[derive(Serialize)]
struct EventJson<'a> {
    ts: &'a str,
    cmd: &'a str,
    task_id: &'a Option<String>,
    pane: &'a Option<String>,
    result: &'a Option<String>,
    error: &'a Option<String>,
}

pub fn render_events_json(events: &[crate::events::Event]) -> String {
    let body: Vec<Value> = events
        .iter()
        .map(|e| {
            serde_json::to_value(EventJson {
                ts: &e.ts,
                cmd: &e.cmd,
                task_id: &e.task_id,
                pane: &e.pane,
                result: &e.result,
                error: &e.error,
            })
            .unwrap_or(Value::Null)
        })
        .collect();
    envelope("events", json!({ "events": body }))
}

pub fn render_cleanup_plan_json(plan: &crate::cleanup::CleanupPlan) -> String {
    envelope(
        "cleanup",
        json!({
            "stale_locks": plan.stale_locks.iter().map(|l| l.task_id.clone()).collect::<Vec<_>>(),
            "corrupted_locks": plan.corrupted_locks.iter().map(|c| c.path.display().to_string()).collect::<Vec<_>>(),
            "orphan_worktrees": plan.orphan_worktrees.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
            "stale_worktrees": plan.stale_worktrees.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        }),
    )
}

pub fn render_lock_state(state: Option<TaskState>) -> Value {
    match state {
        Some(s) => json!(format!("{s:?}")),
        None => Value::Null,
    }
}
