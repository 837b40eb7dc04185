//! Resume executor (C9): the worktree -> window -> lock -> contract state
//! machine that brings a task's worker online.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

use anyhow::Result;
use chrono::Utc;
use regex::Regex;

use crate::contract::{self, ContractEnvelope};
use crate::errors::VillageError;
use crate::events;
use crate::locks::{self, Lock};
use crate::panes::PaneSetCache;
use crate::process::ProcessRunner;
use crate::scm::Scm;
use crate::worktrees::{self, WorktreeInfo};

pub const MAX_RETRIES: u32 = 3;
pub const AGENT_COMMAND: &str = "opencode";

#[derive(Debug, Clone)]
pub struct ResumeResult {
    pub success: bool,
    pub task_id: String,
    pub agent: String,
    pub worktree_path: PathBuf,
    pub window_name: String,
    pub pane_id: String,
    pub error: Option<String>,
}

static TASK_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+?)(?:-(\d+))?$").unwrap());

/// Pattern: `<agent>-<worker_num>-<task_id>`, e.g. `build-1-bd-a3f8`. A
/// numeric suffix already on the task id (from a prior collision retry)
/// becomes the worker number instead of being duplicated.
fn generate_resume_window(task_id: &str, agent: &str) -> String {
    if let Some(caps) = TASK_ID_PATTERN.captures(task_id)
        && let Some(suffix) = caps.get(2)
        && let Ok(worker_num) = suffix.as_str().parse::<u32>()
    {
        return format!("{agent}-{worker_num}-{}", &caps[1]);
    }
    format!("{agent}-1-{task_id}")
}

/// Global interrupt flag polled between resume phases; `ctrlc` sets this on
/// SIGINT rather than killing the process mid-subprocess.
pub static INTERRUPTED: AtomicBool = AtomicBool::new(false);

fn check_interrupted(task_id: &str) -> Result<()> {
    if INTERRUPTED.load(Ordering::SeqCst) {
        return Err(VillageError::Interrupted(format!(
            "resume of task '{task_id}' interrupted; created resources left for manual cleanup"
        ))
        .into());
    }
    Ok(())
}

/// (W3) Retries under collision by suffixing the task id, up to
/// [`MAX_RETRIES`]; a non-collision failure aborts immediately.
fn ensure_worktree_exists(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    repo_root: &Path,
    worktrees_dir: &Path,
    base_task_id: &str,
    agent: &str,
) -> Result<(WorktreeInfo, String, String)> {
    let mut task_id = base_task_id.to_string();

    for attempt in 0..MAX_RETRIES {
        if let Some(info) = worktrees::get_worktree_info(scm, runner, repo_root, &task_id)? {
            let window_name = generate_resume_window(&task_id, agent);
            return Ok((info, window_name, task_id));
        }

        match worktrees::create_worktree(scm, runner, repo_root, worktrees_dir, &task_id)? {
            Ok(info) => {
                let window_name = generate_resume_window(&task_id, agent);
                return Ok((info, window_name, task_id));
            }
            Err(()) if attempt + 1 < MAX_RETRIES => {
                task_id = format!("{base_task_id}-{}", attempt + 2);
                tracing::debug!(task_id, "worktree collision, retrying with suffixed task id");
            }
            Err(()) => {
                return Err(VillageError::Blocked(format!(
                    "worktree creation failed after {MAX_RETRIES} attempts for task '{base_task_id}'"
                ))
                .into());
            }
        }
    }
    unreachable!("loop always returns within MAX_RETRIES iterations")
}

fn create_resume_window(
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    session_name: &str,
    window_name: &str,
) -> Result<String> {
    runner.run_output(
        &["tmux", "new-window", "-t", session_name, "-n", window_name, "-d"],
        None,
    )?;
    let fresh = panes.refresh_panes(runner, session_name)?;
    fresh
        .into_iter()
        .last()
        .ok_or_else(|| VillageError::Blocked(format!("no panes found after creating window '{window_name}'")).into())
}

fn inject_contract(
    runner: &dyn ProcessRunner,
    session_name: &str,
    pane_id: &str,
    contract: &ContractEnvelope,
) -> Result<()> {
    let heredoc = contract::compose_heredoc(AGENT_COMMAND, contract)?;
    let target = format!("{session_name}:{pane_id}");
    runner.run_output(&["tmux", "send-keys", "-t", &target, &heredoc], None)?;
    runner.run_output(&["tmux", "send-keys", "-t", &target, "Enter"], None)?;
    Ok(())
}

/// (I2 last line of defense) Refuses to resume a task that already has an
/// active lock, even if the caller bypassed queue-level dedup.
pub fn guard_against_active_lock(locks_dir: &Path, live_panes: &std::collections::HashSet<String>, task_id: &str) -> Result<()> {
    let path = locks::lock_path(locks_dir, task_id);
    if !path.exists() {
        return Ok(());
    }
    if let Ok(lock) = locks::parse_lock(&path)?
        && locks::is_active(&lock, live_panes)
    {
        return Err(VillageError::Blocked(format!("task '{task_id}' already has an active lock")).into());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn execute_resume(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    repo_root: &Path,
    worktrees_dir: &Path,
    locks_dir: &Path,
    event_log_path: &Path,
    session_name: &str,
    task_id: &str,
    agent: &str,
    dry_run: bool,
) -> ResumeResult {
    events::log_start(event_log_path, "resume", Some(task_id)).ok();

    let result = execute_resume_inner(
        scm,
        runner,
        panes,
        repo_root,
        worktrees_dir,
        locks_dir,
        session_name,
        task_id,
        agent,
        dry_run,
    );

    match result {
        Ok(resume_result) => {
            events::log_ok(
                event_log_path,
                "resume",
                Some(&resume_result.task_id),
                Some(&resume_result.pane_id),
            )
            .ok();
            resume_result
        }
        Err(e) => {
            events::log_error(event_log_path, "resume", Some(task_id), &e.to_string()).ok();
            ResumeResult {
                success: false,
                task_id: task_id.to_string(),
                agent: agent.to_string(),
                worktree_path: PathBuf::new(),
                window_name: String::new(),
                pane_id: String::new(),
                error: Some(e.to_string()),
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_resume_inner(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    panes: &PaneSetCache,
    repo_root: &Path,
    worktrees_dir: &Path,
    locks_dir: &Path,
    session_name: &str,
    base_task_id: &str,
    agent: &str,
    dry_run: bool,
) -> Result<ResumeResult> {
    let live_panes = panes.panes(runner, session_name, false)?;
    guard_against_active_lock(locks_dir, &live_panes, base_task_id)?;

    check_interrupted(base_task_id)?;
    let (worktree, window_name, task_id) =
        ensure_worktree_exists(scm, runner, repo_root, worktrees_dir, base_task_id, agent)?;

    if dry_run {
        return Ok(ResumeResult {
            success: true,
            task_id,
            agent: agent.to_string(),
            worktree_path: worktree.path,
            window_name,
            pane_id: String::new(),
            error: None,
        });
    }

    check_interrupted(&task_id)?;
    let pane_id = create_resume_window(runner, panes, session_name, &window_name)?;

    check_interrupted(&task_id)?;
    let claimed_at = Utc::now();
    let lock = Lock {
        task_id: task_id.clone(),
        pane_id: pane_id.clone(),
        window_name: window_name.clone(),
        agent: agent.to_string(),
        claimed_at,
        state: None,
        state_history: Vec::new(),
    };
    locks::write_lock(locks_dir, &lock)?;

    check_interrupted(&task_id)?;
    let contract = ContractEnvelope::new(&task_id, agent, &worktree.path, repo_root, &window_name, claimed_at);
    inject_contract(runner, session_name, &pane_id, &contract)?;

    Ok(ResumeResult {
        success: true,
        task_id,
        agent: agent.to_string(),
        worktree_path: worktree.path,
        window_name,
        pane_id,
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessRunner;
    use crate::scm::GitScm;
    use std::collections::HashSet;

    #[test]
    fn generate_resume_window_plain_task_id() {
        assert_eq!(generate_resume_window("bd-a3f8", "build"), "build-1-bd-a3f8");
    }

    #[test]
    fn generate_resume_window_with_retry_suffix() {
        assert_eq!(generate_resume_window("bd-a3f8-2", "build"), "build-2-bd-a3f8");
    }

    #[test]
    fn guard_allows_when_no_lock_exists() {
        let dir = tempfile::tempdir().unwrap();
        let live = HashSet::new();
        assert!(guard_against_active_lock(&dir.path().join("locks"), &live, "bd-a3f8").is_ok());
    }

    #[test]
    fn guard_blocks_when_lock_is_active() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        std::fs::create_dir_all(&locks_dir).unwrap();
        locks::write_lock(
            &locks_dir,
            &Lock {
                task_id: "bd-a3f8".to_string(),
                pane_id: "%1".to_string(),
                window_name: "w".to_string(),
                agent: "build".to_string(),
                claimed_at: Utc::now(),
                state: None,
                state_history: Vec::new(),
            },
        )
        .unwrap();
        let mut live = HashSet::new();
        live.insert("%1".to_string());
        let err = guard_against_active_lock(&locks_dir, &live, "bd-a3f8").unwrap_err();
        assert_eq!(
            err.downcast_ref::<VillageError>().unwrap().kind_tag(),
            "blocked"
        );
    }

    #[test]
    fn execute_resume_dry_run_creates_no_lock_or_window() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        let event_log = dir.path().join("events.log");

        let runner = FakeProcessRunner::new();
        runner.script(&["tmux", "has-session"], Some(1), "", "");
        runner.script_ok(&["git", "worktree", "add"], "");
        runner.script_ok(&["git", "worktree", "list"], "");
        let panes = PaneSetCache::new();

        let result = execute_resume(
            &GitScm,
            &runner,
            &panes,
            dir.path(),
            &worktrees_dir,
            &locks_dir,
            &event_log,
            "village",
            "bd-a3f8",
            "build",
            true,
        );
        assert!(result.success);
        assert!(result.pane_id.is_empty());
        assert!(!locks_dir.join("bd-a3f8.lock").exists());
    }

    #[test]
    fn execute_resume_happy_path_writes_lock_and_injects_contract() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        let event_log = dir.path().join("events.log");

        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(&["tmux", "list-panes"], "%1\n");
        runner.script_ok(&["git", "worktree", "add"], "");
        runner.script_ok(&["git", "worktree", "list"], "");
        runner.script_ok(&["tmux", "new-window"], "");
        runner.script_ok(&["tmux", "send-keys"], "");

        let panes = PaneSetCache::new();

        let result = execute_resume(
            &GitScm,
            &runner,
            &panes,
            dir.path(),
            &worktrees_dir,
            &locks_dir,
            &event_log,
            "village",
            "bd-a3f8",
            "build",
            false,
        );
        assert!(result.success);
        assert_eq!(result.pane_id, "%1");
        assert!(locks_dir.join("bd-a3f8.lock").exists());

        let events = events::read_events(&event_log).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].result.as_deref(), Some("ok"));
    }

    #[test]
    fn execute_resume_reuses_existing_worktree() {
        let dir = tempfile::tempdir().unwrap();
        let locks_dir = dir.path().join("locks");
        let worktrees_dir = dir.path().join("worktrees");
        let event_log = dir.path().join("events.log");
        std::fs::create_dir_all(worktrees_dir.join("bd-a3f8")).unwrap();

        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "");
        runner.script_ok(
            &["git", "worktree", "list"],
            &format!("worktree {}\nHEAD aaa\nbranch refs/heads/worktree-bd-a3f8\n\n", worktrees_dir.join("bd-a3f8").display()),
        );
        runner.script_ok(&["tmux", "new-window"], "");
        runner.script_ok(&["tmux", "list-panes"], "%1\n");
        runner.script_ok(&["tmux", "send-keys"], "");

        let panes = PaneSetCache::new();
        let result = execute_resume(
            &GitScm,
            &runner,
            &panes,
            dir.path(),
            &worktrees_dir,
            &locks_dir,
            &event_log,
            "village",
            "bd-a3f8",
            "build",
            false,
        );
        assert!(result.success);
        // Worktree already existed: `git worktree add` must never be called.
        assert!(!runner.calls.lock().unwrap().iter().any(|(cmd, _)| cmd.contains(&"add".to_string())));
    }
}
