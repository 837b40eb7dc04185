//! Ready-task source: the boundary between this orchestrator and whatever
//! external tool tracks task readiness. Invoked as a plain subprocess whose
//! stdout is newline-delimited, first token per line is the task id.

use anyhow::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::process::ProcessRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyTask {
    pub task_id: String,
    pub agent: String,
    pub raw_line: String,
}

/// Best-effort probe for whether a ready-task source is usable at all: the
/// command exists and the repository has been initialized for it. Absence is
/// not an error — callers treat it as "no ready tasks" rather than failing.
pub fn ready_source_available(runner: &dyn ProcessRunner, repo_root: &std::path::Path) -> bool {
    let Ok(which) = runner.run(&["which", "bd"], None) else {
        return false;
    };
    if !which.success() {
        return false;
    }
    repo_root.join(".beads").is_dir()
}

/// List ready tasks from the external source. Any subprocess failure is
/// swallowed and reported as no tasks, matching the reference's
/// catch-and-log-warning behavior — a flaky or missing ready-task source must
/// never abort the queue command outright.
pub fn list(runner: &dyn ProcessRunner, repo_root: &std::path::Path, default_agent: &str) -> Vec<ReadyTask> {
    if !ready_source_available(runner, repo_root) {
        return Vec::new();
    }
    let output = match runner.run_output(&["bd", "ready"], Some(repo_root)) {
        Ok(out) => out,
        Err(e) => {
            tracing::warn!(error = %e, "failed to extract ready tasks");
            return Vec::new();
        }
    };
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|line| {
            let task_id = line.split_whitespace().next().unwrap_or(line).to_string();
            let agent = extract_agent_from_metadata(line, default_agent);
            ReadyTask {
                task_id,
                agent,
                raw_line: line.to_string(),
            }
        })
        .collect()
}

static AGENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)agent:(\w+)").unwrap(),
        Regex::new(r"(?i)agent=(\w+)").unwrap(),
        Regex::new(r"(?i)agent/(\w+)").unwrap(),
    ]
});

/// Priority: an `agent:X` / `agent=X` / `agent/X` label anywhere in the line,
/// first pattern and first match wins; otherwise the configured default.
pub fn extract_agent_from_metadata(output_line: &str, default_agent: &str) -> String {
    for pattern in AGENT_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(output_line) {
            return caps[1].to_lowercase();
        }
    }
    default_agent.to_string()
}
