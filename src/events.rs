//! Event log (C5): append-only JSON-lines record of every mutating command
//! and its outcome, plus the deduplication primitive consumed by C8 and the
//! query helper behind the `events` verb (§2a).

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: String,
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn append(path: &Path, event: &Event) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(event).context("failed to serialize event")?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open event log {}", path.display()))?;
    writeln!(file, "{json}")?;
    file.flush()?;
    Ok(())
}

pub fn log_start(path: &Path, cmd: &str, task_id: Option<&str>) -> Result<()> {
    append(
        path,
        &Event {
            ts: Utc::now().to_rfc3339(),
            cmd: cmd.to_string(),
            task_id: task_id.map(str::to_string),
            pane: None,
            result: None,
            error: None,
        },
    )
}

pub fn log_ok(path: &Path, cmd: &str, task_id: Option<&str>, pane: Option<&str>) -> Result<()> {
    append(
        path,
        &Event {
            ts: Utc::now().to_rfc3339(),
            cmd: cmd.to_string(),
            task_id: task_id.map(str::to_string),
            pane: pane.map(str::to_string),
            result: Some("ok".to_string()),
            error: None,
        },
    )
}

pub fn log_error(path: &Path, cmd: &str, task_id: Option<&str>, message: &str) -> Result<()> {
    append(
        path,
        &Event {
            ts: Utc::now().to_rfc3339(),
            cmd: cmd.to_string(),
            task_id: task_id.map(str::to_string),
            pane: None,
            result: Some("error".to_string()),
            error: Some(message.to_string()),
        },
    )
}

/// Readers tolerate and skip malformed lines, advancing without throwing.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read event log {}", path.display()))?;
    let mut events = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(error = %e, "skipping malformed event log line"),
        }
    }
    Ok(events)
}

fn parse_ts(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts).ok().map(|d| d.with_timezone(&Utc))
}

/// Dedup primitive consumed by C8. An invalid timestamp on the most recent
/// matching event counts as "not recent" — the orchestrator fails open in
/// favor of making progress rather than wedging on a corrupted record.
pub fn is_task_recent(events: &[Event], task_id: &str, ttl_minutes: u32) -> (bool, Option<Event>) {
    if ttl_minutes == 0 {
        return (false, None);
    }
    let Some(last) = events
        .iter()
        .filter(|e| e.task_id.as_deref() == Some(task_id))
        .max_by_key(|e| e.ts.clone())
        .cloned()
    else {
        return (false, None);
    };

    let Some(last_ts) = parse_ts(&last.ts) else {
        tracing::warn!(task_id, ts = %last.ts, "invalid event timestamp, treating as not recent");
        return (false, Some(last));
    };

    let recent = Utc::now() - last_ts < Duration::minutes(i64::from(ttl_minutes));
    (recent, Some(last))
}

#[derive(Debug, Default, Clone)]
pub struct EventFilters {
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub last: Option<Duration>,
}

pub fn query_events(path: &Path, filters: &EventFilters) -> Result<Vec<Event>> {
    let events = read_events(path)?;
    let mut filtered: Vec<Event> = events;

    if let Some(task_id) = &filters.task_id {
        filtered.retain(|e| e.task_id.as_deref() == Some(task_id.as_str()));
    }
    if let Some(status) = &filters.status {
        filtered.retain(|e| e.result.as_deref() == Some(status.as_str()));
    }
    if let Some(since) = filters.since {
        filtered.retain(|e| parse_ts(&e.ts).is_some_and(|ts| ts >= since));
    }
    if let Some(last) = filters.last {
        let cutoff = Utc::now() - last;
        filtered.retain(|e| parse_ts(&e.ts).is_some_and(|ts| ts >= cutoff));
    }
    Ok(filtered)
}
