//! Lock registry (C3): per-task lock records stored one file per task under
//! `<village>/locks/<task_id>.lock`, in a plain `key=value` text format.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    InProgress,
    Paused,
    Completed,
    Failed,
}

impl TaskState {
    fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::InProgress => "in_progress",
            TaskState::Paused => "paused",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "queued" => TaskState::Queued,
            "in_progress" => TaskState::InProgress,
            "paused" => TaskState::Paused,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub ts: DateTime<Utc>,
    pub from_state: String,
    pub to_state: String,
    pub context: String,
}

#[derive(Debug, Clone)]
pub struct Lock {
    pub task_id: String,
    pub pane_id: String,
    pub window_name: String,
    pub agent: String,
    pub claimed_at: DateTime<Utc>,
    pub state: Option<TaskState>,
    pub state_history: Vec<StateTransition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Active,
    Stale,
}

/// A lock file that exists but failed to parse (I4: never silently deleted
/// or overwritten by anything but the reconciler).
#[derive(Debug)]
pub struct CorruptedLock {
    pub path: PathBuf,
    pub reason: String,
}

pub fn lock_path(locks_dir: &Path, task_id: &str) -> PathBuf {
    locks_dir.join(format!("{task_id}.lock"))
}

/// Parse a lock file. Fails soft: malformed content returns `Ok(Err(..))`,
/// never a hard error — only I/O failures reading the file itself propagate.
pub fn parse_lock(path: &Path) -> Result<std::result::Result<Lock, CorruptedLock>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read lock file {}", path.display()))?;

    let mut fields: HashMap<&str, &str> = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key.trim(), value.trim());
        }
    }

    let corrupted = |reason: &str| {
        Ok(Err(CorruptedLock {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }))
    };

    let Some(id) = fields.get("id") else {
        return corrupted("missing id= line");
    };
    let Some(pane) = fields.get("pane") else {
        return corrupted("missing pane= line");
    };
    let Some(window) = fields.get("window") else {
        return corrupted("missing window= line");
    };
    let Some(agent) = fields.get("agent") else {
        return corrupted("missing agent= line");
    };
    let Some(claimed_at_str) = fields.get("claimed_at") else {
        return corrupted("missing claimed_at= line");
    };

    // I1: the file name must match the in-file task_id.
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if stem != *id {
        return corrupted(&format!("path encodes task_id '{stem}' but file says '{id}'"));
    }

    let Ok(claimed_at) = DateTime::parse_from_rfc3339(claimed_at_str) else {
        return corrupted(&format!("invalid claimed_at timestamp '{claimed_at_str}'"));
    };

    let state = fields.get("state").and_then(|s| TaskState::parse(s));
    let state_history = fields
        .get("state_history")
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default();

    Ok(Ok(Lock {
        task_id: (*id).to_string(),
        pane_id: (*pane).to_string(),
        window_name: (*window).to_string(),
        agent: (*agent).to_string(),
        claimed_at: claimed_at.with_timezone(&Utc),
        state,
        state_history,
    }))
}

fn serialize_lock(lock: &Lock) -> String {
    let mut out = format!(
        "id={}\npane={}\nwindow={}\nagent={}\nclaimed_at={}\n",
        lock.task_id,
        lock.pane_id,
        lock.window_name,
        lock.agent,
        lock.claimed_at.to_rfc3339(),
    );
    if let Some(state) = lock.state {
        out.push_str(&format!("state={}\n", state.as_str()));
    }
    if !lock.state_history.is_empty() {
        let json = serde_json::to_string(&lock.state_history).unwrap_or_default();
        out.push_str(&format!("state_history={json}\n"));
    }
    out
}

/// Write atomically: write to a temp file in the same directory, then rename.
/// Overwrites any existing lock for the same `task_id`.
pub fn write_lock(locks_dir: &Path, lock: &Lock) -> Result<()> {
    std::fs::create_dir_all(locks_dir)?;
    let final_path = lock_path(locks_dir, &lock.task_id);
    let tmp_path = locks_dir.join(format!(".{}.lock.tmp", lock.task_id));
    std::fs::write(&tmp_path, serialize_lock(lock))
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, &final_path)
        .with_context(|| format!("failed to rename into {}", final_path.display()))?;
    Ok(())
}

pub fn remove_lock(locks_dir: &Path, task_id: &str) -> Result<()> {
    let path = lock_path(locks_dir, task_id);
    std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))
}

/// List every `*.lock` file's parse outcome under `locks_dir`. Absence of the
/// directory is not an error — it means no locks exist yet.
pub fn list_lock_files(locks_dir: &Path) -> Result<Vec<std::result::Result<Lock, CorruptedLock>>> {
    if !locks_dir.exists() {
        return Ok(Vec::new());
    }
    let mut results = Vec::new();
    for entry in std::fs::read_dir(locks_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("lock") {
            results.push(parse_lock(&path)?);
        }
    }
    Ok(results)
}

/// (I3) Pure mapping from a set of locks to ACTIVE/STALE given a pane set.
/// Classification never touches the file contents — it is derived solely
/// from membership in `live_panes`.
pub fn evaluate_locks(locks: &[Lock], live_panes: &HashSet<String>) -> HashMap<String, LockStatus> {
    locks
        .iter()
        .map(|lock| {
            let status = if live_panes.contains(&lock.pane_id) {
                LockStatus::Active
            } else {
                LockStatus::Stale
            };
            (lock.task_id.clone(), status)
        })
        .collect()
}

pub fn is_active(lock: &Lock, live_panes: &HashSet<String>) -> bool {
    live_panes.contains(&lock.pane_id)
}
