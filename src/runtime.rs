//! Runtime lifecycle (C10): `village up`/`down` — idempotent creation and
//! teardown of the multiplexer session, state directories, and dashboard
//! window.

use std::path::Path;

use anyhow::Result;

use crate::panes;
use crate::process::ProcessRunner;

const DASHBOARD_WINDOW: &str = "dashboard";

#[derive(Debug, Clone, Copy)]
pub struct RuntimeState {
    pub session_exists: bool,
    pub directories_exist: bool,
    pub ready_source_initialized: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct InitializationPlan {
    pub needs_session: bool,
    pub needs_directories: bool,
    pub needs_ready_source_init: bool,
}

pub fn collect_runtime_state(
    runner: &dyn ProcessRunner,
    session_name: &str,
    village_dir: &Path,
    repo_root: &Path,
) -> Result<RuntimeState> {
    Ok(RuntimeState {
        session_exists: panes::session_exists(runner, session_name)?,
        directories_exist: village_dir.exists(),
        ready_source_initialized: repo_root.join(".beads").exists(),
    })
}

pub fn plan_initialization(state: RuntimeState) -> InitializationPlan {
    InitializationPlan {
        needs_session: !state.session_exists,
        needs_directories: !state.directories_exist,
        needs_ready_source_init: !state.ready_source_initialized,
    }
}

fn ensure_directories(village_dir: &Path, locks_dir: &Path, worktrees_dir: &Path, dry_run: bool) -> Result<()> {
    if village_dir.exists() || dry_run {
        return Ok(());
    }
    std::fs::create_dir_all(village_dir)?;
    std::fs::create_dir_all(locks_dir)?;
    std::fs::create_dir_all(worktrees_dir)?;
    Ok(())
}

/// Best-effort: a missing or uninitialized ready-task backend must never
/// prevent the runtime from coming up, since queueing is optional.
fn ensure_ready_source_initialized(runner: &dyn ProcessRunner, repo_root: &Path, dry_run: bool) -> Result<()> {
    if repo_root.join(".beads").exists() || dry_run {
        return Ok(());
    }
    if runner.run(&["bd", "init"], Some(repo_root)).is_err() {
        tracing::debug!("ready-task backend command unavailable, skipping initialization");
    }
    Ok(())
}

fn ensure_session(runner: &dyn ProcessRunner, session_name: &str, dry_run: bool) -> Result<()> {
    if panes::session_exists(runner, session_name)? || dry_run {
        return Ok(());
    }
    runner.run_output(&["tmux", "new-session", "-d", "-s", session_name], None)?;
    Ok(())
}

fn list_windows(runner: &dyn ProcessRunner, session_name: &str) -> Result<Vec<String>> {
    if !panes::session_exists(runner, session_name)? {
        return Ok(Vec::new());
    }
    let out = runner.run_output(
        &["tmux", "list-windows", "-t", session_name, "-F", "#{window_name}"],
        None,
    )?;
    Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}

fn create_dashboard(runner: &dyn ProcessRunner, session_name: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        return Ok(());
    }
    let windows = list_windows(runner, session_name)?;
    if windows.iter().any(|w| w == DASHBOARD_WINDOW) {
        return Ok(());
    }
    runner.run_output(
        &[
            "tmux",
            "new-window",
            "-t",
            session_name,
            "-n",
            DASHBOARD_WINDOW,
            "watch -n 2 village status --short",
        ],
        None,
    )?;
    Ok(())
}

pub fn execute_initialization(
    runner: &dyn ProcessRunner,
    plan: InitializationPlan,
    session_name: &str,
    village_dir: &Path,
    locks_dir: &Path,
    worktrees_dir: &Path,
    repo_root: &Path,
    dry_run: bool,
    with_dashboard: bool,
) -> Result<()> {
    if plan.needs_directories {
        ensure_directories(village_dir, locks_dir, worktrees_dir, dry_run)?;
    }
    if plan.needs_session {
        ensure_session(runner, session_name, dry_run)?;
    }
    if plan.needs_ready_source_init {
        ensure_ready_source_initialized(runner, repo_root, dry_run)?;
    }
    if with_dashboard {
        create_dashboard(runner, session_name, dry_run)?;
    }
    Ok(())
}

/// Does not delete locks, worktrees, or `.village/` — only kills the
/// multiplexer session.
pub fn shutdown_runtime(runner: &dyn ProcessRunner, session_name: &str) -> Result<()> {
    if !panes::session_exists(runner, session_name)? {
        return Ok(());
    }
    runner.run_output(&["tmux", "kill-session", "-t", session_name], None)?;
    Ok(())
}
