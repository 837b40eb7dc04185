//! Worktree manager (C4): create/list/delete git worktrees under a known
//! directory. Does not touch locks and does not know about panes.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::errors::VillageError;
use crate::process::ProcessRunner;
use crate::scm::Scm;

#[derive(Debug, Clone)]
pub struct WorktreeInfo {
    pub task_id: String,
    pub path: PathBuf,
    pub branch: String,
    pub head_commit: Option<String>,
}

pub fn branch_name(task_id: &str) -> String {
    format!("worktree-{task_id}")
}

/// (W3) Creation is not atomic with lock creation; callers (C9) are expected
/// to treat a collision as reusable state under a retry policy, not a fatal
/// error in itself.
pub fn create_worktree(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    repo_root: &Path,
    worktrees_dir: &Path,
    task_id: &str,
) -> Result<std::result::Result<WorktreeInfo, ()>> {
    let path = worktrees_dir.join(task_id);
    if path.exists() {
        return Ok(Err(()));
    }
    let branch = branch_name(task_id);
    match scm.worktree_add(runner, repo_root, &path, &branch)? {
        Ok(()) => Ok(Ok(WorktreeInfo {
            task_id: task_id.to_string(),
            path,
            branch,
            head_commit: None,
        })),
        Err(_collision) => Ok(Err(())),
    }
}

pub fn get_worktree_info(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    repo_root: &Path,
    task_id: &str,
) -> Result<Option<WorktreeInfo>> {
    Ok(list_worktrees(scm, runner, repo_root)?
        .into_iter()
        .find(|w| w.task_id == task_id))
}

/// Worktree directory names under `worktrees_dir` are the task identities;
/// correlate each against `git worktree list` for branch/head metadata.
pub fn list_worktrees(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    repo_root: &Path,
) -> Result<Vec<WorktreeInfo>> {
    let entries = scm.worktree_list(runner, repo_root)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| {
            let task_id = entry.path.file_name()?.to_str()?.to_string();
            let branch = entry.branch.unwrap_or_else(|| branch_name(&task_id));
            Some(WorktreeInfo {
                task_id,
                path: entry.path,
                branch,
                head_commit: entry.head_commit,
            })
        })
        // The repo root itself shows up as the first `git worktree list`
        // entry; it is never one of ours.
        .filter(|w| w.path != repo_root)
        .collect())
}

pub fn delete_worktree(
    scm: &dyn Scm,
    runner: &dyn ProcessRunner,
    repo_root: &Path,
    worktrees_dir: &Path,
    task_id: &str,
) -> Result<()> {
    let path = worktrees_dir.join(task_id);
    if !path.exists() {
        return Err(VillageError::LockValidation(format!(
            "no worktree directory for task '{task_id}'"
        ))
        .into());
    }
    scm.worktree_remove(runner, repo_root, &path)
}
