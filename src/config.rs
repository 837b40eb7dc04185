//! Configuration loading and path helpers.
//!
//! Precedence, lowest to highest: built-in defaults, `<git_root>/.village.toml`,
//! `VILLAGE_*` environment variable overrides. `git_root` itself is never a
//! config key a user sets — it is always derived from the repository probe
//! and threaded through explicitly as a field on the loaded [`Config`].

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::errors::VillageError;

/// The only fully-supported SCM backend; see [`crate::scm`].
pub const GIT_SCM_KIND: &str = "git";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub village_dir: Option<PathBuf>,
    pub worktrees_dir: Option<PathBuf>,
    pub session_name: String,
    pub default_agent: String,
    pub max_workers: u32,
    pub queue_ttl_minutes: u32,
    pub scm_kind: String,

    /// Repo root; never read from the TOML file or environment, always
    /// derived from the git probe and filled in by [`Config::load`].
    #[serde(skip)]
    pub git_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            village_dir: None,
            worktrees_dir: None,
            session_name: "village".to_string(),
            default_agent: "worker".to_string(),
            max_workers: 3,
            queue_ttl_minutes: 10,
            scm_kind: GIT_SCM_KIND.to_string(),
            git_root: PathBuf::new(),
        }
    }
}

impl Config {
    /// Absolute path to the village state directory: `<git_root>/.village`.
    pub fn village_dir(&self) -> PathBuf {
        self.village_dir
            .clone()
            .unwrap_or_else(|| self.git_root.join(".village"))
    }

    /// Absolute path to the worktrees directory: `<git_root>/.worktrees`.
    pub fn worktrees_dir(&self) -> PathBuf {
        self.worktrees_dir
            .clone()
            .unwrap_or_else(|| self.git_root.join(".worktrees"))
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.village_dir().join("locks")
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.village_dir().join("events.log")
    }

    /// Create `village_dir`, `locks/`, and `worktrees_dir` if missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.village_dir()).context("failed to create .village/")?;
        std::fs::create_dir_all(self.locks_dir()).context("failed to create .village/locks/")?;
        std::fs::create_dir_all(self.worktrees_dir()).context("failed to create .worktrees/")?;
        Ok(())
    }

    pub fn dirs_exist(&self) -> bool {
        self.village_dir().exists()
    }

    /// Reject an `scm_kind` other than `git` at startup rather than silently
    /// ignoring it (§2a: the seam is kept open, the backend is not).
    pub fn validate(&self) -> Result<()> {
        if self.scm_kind != GIT_SCM_KIND {
            return Err(VillageError::Config(format!(
                "scm_kind '{}' is not supported; only '{GIT_SCM_KIND}' is a fully-supported variant",
                self.scm_kind
            ))
            .into());
        }
        if self.max_workers == 0 {
            return Err(VillageError::Config("max_workers must be >= 1".into()).into());
        }
        Ok(())
    }
}

/// Load configuration for a repository rooted at `git_root`: defaults, then
/// `<git_root>/.village.toml` if present, then `VILLAGE_*` env overrides.
pub fn load(git_root: &Path) -> Result<Config> {
    let mut config = load_from_file(git_root)?;
    config.git_root = git_root.to_path_buf();
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn load_from_file(git_root: &Path) -> Result<Config> {
    let path = git_root.join(".village.toml");
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("VILLAGE_SESSION_NAME") {
        config.session_name = v;
    }
    if let Ok(v) = std::env::var("VILLAGE_DEFAULT_AGENT") {
        config.default_agent = v;
    }
    if let Ok(v) = std::env::var("VILLAGE_MAX_WORKERS")
        && let Ok(n) = v.parse()
    {
        config.max_workers = n;
    }
    if let Ok(v) = std::env::var("VILLAGE_QUEUE_TTL_MINUTES")
        && let Ok(n) = v.parse()
    {
        config.queue_ttl_minutes = n;
    }
    if let Ok(v) = std::env::var("VILLAGE_VILLAGE_DIR") {
        config.village_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("VILLAGE_WORKTREES_DIR") {
        config.worktrees_dir = Some(PathBuf::from(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::default();
        assert_eq!(config.session_name, "village");
        assert_eq!(config.default_agent, "worker");
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.queue_ttl_minutes, 10);
        assert_eq!(config.scm_kind, "git");
    }

    #[test]
    fn path_helpers_default_under_git_root() {
        let mut config = Config::default();
        config.git_root = PathBuf::from("/repo");
        assert_eq!(config.village_dir(), PathBuf::from("/repo/.village"));
        assert_eq!(config.worktrees_dir(), PathBuf::from("/repo/.worktrees"));
        assert_eq!(config.locks_dir(), PathBuf::from("/repo/.village/locks"));
    }

    #[test]
    fn explicit_dirs_override_derived_ones() {
        let mut config = Config::default();
        config.git_root = PathBuf::from("/repo");
        config.village_dir = Some(PathBuf::from("/elsewhere/state"));
        assert_eq!(config.village_dir(), PathBuf::from("/elsewhere/state"));
    }

    #[test]
    fn validate_rejects_non_git_scm() {
        let mut config = Config::default();
        config.scm_kind = "jujutsu".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.downcast_ref::<VillageError>().unwrap().kind_tag(),
            "config"
        );
    }

    #[test]
    fn validate_rejects_zero_max_workers() {
        let mut config = Config::default();
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.git_root, dir.path());
        assert_eq!(config.max_workers, 3);
    }

    #[test]
    fn load_parses_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".village.toml"),
            "session_name = \"my-session\"\nmax_workers = 7\n",
        )
        .unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.session_name, "my-session");
        assert_eq!(config.max_workers, 7);
    }
}
