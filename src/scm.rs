//! Version-control backend seam (§2a). The reference this spec distills from
//! supports an alternate SCM (Jujutsu) behind `scm_kind`; this repo keeps the
//! trait seam open without wiring up a second backend — `scm_kind` values
//! other than `git` are rejected at config-load time (see [`crate::config`]).

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::errors::VillageError;
use crate::process::ProcessRunner;

/// A named git worktree collision: the branch or the target path already exists.
#[derive(Debug)]
pub struct CollisionError;

pub trait Scm {
    /// Resolve the repository root for the current working directory.
    fn rev_parse_root(&self, runner: &dyn ProcessRunner) -> Result<PathBuf>;

    /// Create branch `branch` at `HEAD` and a worktree for it at `path`.
    /// Returns `Ok(Err(CollisionError))` (not an error kind) when the branch
    /// or path already exists, so callers can retry with a suffix.
    fn worktree_add(
        &self,
        runner: &dyn ProcessRunner,
        repo_root: &Path,
        path: &Path,
        branch: &str,
    ) -> Result<std::result::Result<(), CollisionError>>;

    fn worktree_remove(&self, runner: &dyn ProcessRunner, repo_root: &Path, path: &Path) -> Result<()>;

    fn worktree_list(&self, runner: &dyn ProcessRunner, repo_root: &Path) -> Result<Vec<WorktreeEntry>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head_commit: Option<String>,
}

pub struct GitScm;

impl Scm for GitScm {
    fn rev_parse_root(&self, runner: &dyn ProcessRunner) -> Result<PathBuf> {
        let out = runner
            .run_output(&["git", "rev-parse", "--show-toplevel"], None)
            .map_err(|_| VillageError::Config("not in a git repository".into()))?;
        Ok(PathBuf::from(out))
    }

    fn worktree_add(
        &self,
        runner: &dyn ProcessRunner,
        repo_root: &Path,
        path: &Path,
        branch: &str,
    ) -> Result<std::result::Result<(), CollisionError>> {
        let path_str = path.to_string_lossy().to_string();
        let output = runner.run(
            &["git", "worktree", "add", "-b", branch, &path_str],
            Some(repo_root),
        )?;
        if output.success() {
            return Ok(Ok(()));
        }
        if is_collision(&output.stderr) {
            return Ok(Err(CollisionError));
        }
        Err(VillageError::SubprocessFailure {
            command: format!("git worktree add -b {branch} {path_str}"),
            exit_code: output.status_code,
            stderr_tail: output.stderr.trim_end().to_string(),
        }
        .into())
    }

    fn worktree_remove(&self, runner: &dyn ProcessRunner, repo_root: &Path, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy().to_string();
        runner.run_output(
            &["git", "worktree", "remove", "--force", &path_str],
            Some(repo_root),
        )?;
        let branch_guess = path
            .file_name()
            .map(|n| format!("worktree-{}", n.to_string_lossy()));
        if let Some(branch) = branch_guess {
            // Best-effort: prune the branch too. Not every worktree's branch
            // follows the naming convention (hand-made worktrees don't), so
            // failures here are not propagated.
            let _ = runner.run(&["git", "branch", "-D", &branch], Some(repo_root));
        }
        Ok(())
    }

    fn worktree_list(&self, runner: &dyn ProcessRunner, repo_root: &Path) -> Result<Vec<WorktreeEntry>> {
        let out = runner.run_output(
            &["git", "worktree", "list", "--porcelain"],
            Some(repo_root),
        )?;
        Ok(parse_worktree_list(&out))
    }
}

/// git's own wording varies by version ("already exists", "already used by
/// worktree at", "is already checked out at"); match on the stable substrings
/// rather than the whole message.
fn is_collision(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("already exists")
        || lower.contains("already used by worktree")
        || lower.contains("already checked out")
}

fn parse_worktree_list(porcelain: &str) -> Vec<WorktreeEntry> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    let mut head: Option<String> = None;

    let flush = |path: &mut Option<PathBuf>, branch: &mut Option<String>, head: &mut Option<String>, entries: &mut Vec<WorktreeEntry>| {
        if let Some(p) = path.take() {
            entries.push(WorktreeEntry {
                path: p,
                branch: branch.take(),
                head_commit: head.take(),
            });
        }
    };

    for line in porcelain.lines() {
        if let Some(rest) = line.strip_prefix("worktree ") {
            flush(&mut path, &mut branch, &mut head, &mut entries);
            path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(rest.trim_start_matches("refs/heads/").to_string());
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            head = Some(rest.to_string());
        }
    }
    flush(&mut path, &mut branch, &mut head, &mut entries);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::FakeProcessRunner;

    #[test]
    fn worktree_add_success() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["git", "worktree", "add"], "");
        let result = GitScm
            .worktree_add(&runner, Path::new("/repo"), Path::new("/repo/.worktrees/t1"), "worktree-t1")
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn worktree_add_detects_collision() {
        let runner = FakeProcessRunner::new();
        runner.script(
            &["git", "worktree", "add"],
            Some(128),
            "",
            "fatal: 'worktree-t1' already exists\n",
        );
        let result = GitScm
            .worktree_add(&runner, Path::new("/repo"), Path::new("/repo/.worktrees/t1"), "worktree-t1")
            .unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn worktree_add_propagates_other_failures() {
        let runner = FakeProcessRunner::new();
        runner.script(&["git", "worktree", "add"], Some(1), "", "fatal: some other error\n");
        let result = GitScm.worktree_add(
            &runner,
            Path::new("/repo"),
            Path::new("/repo/.worktrees/t1"),
            "worktree-t1",
        );
        assert!(result.is_err());
    }

    #[test]
    fn parse_worktree_list_porcelain() {
        let porcelain = "worktree /repo\nHEAD abc123\nbranch refs/heads/main\n\nworktree /repo/.worktrees/t1\nHEAD def456\nbranch refs/heads/worktree-t1\n\n";
        let entries = parse_worktree_list(porcelain);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].path, PathBuf::from("/repo/.worktrees/t1"));
        assert_eq!(entries[1].branch.as_deref(), Some("worktree-t1"));
        assert_eq!(entries[1].head_commit.as_deref(), Some("def456"));
    }

    #[test]
    fn is_collision_matches_known_git_wordings() {
        assert!(is_collision("fatal: 'x' already exists"));
        assert!(is_collision("fatal: branch already used by worktree at '/a'"));
        assert!(is_collision("fatal: 'main' is already checked out at '/b'"));
        assert!(!is_collision("fatal: not a git repository"));
    }
}
