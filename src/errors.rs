//! Closed error taxonomy and exit-code mapping.
//!
//! Every fallible operation in the core returns `anyhow::Result<T>`. Call
//! sites that need a specific recovery behavior (not just "print and exit 1")
//! attach a [`VillageError`] variant via `.context(VillageError::...)` or by
//! returning it directly with `?`; the command surface recovers the kind at
//! the boundary with `error.downcast_ref::<VillageError>()` to pick an exit
//! code, never by matching on message text.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_TRANSIENT: i32 = 2;
pub const EXIT_BLOCKED: i32 = 3;
pub const EXIT_PARTIAL: i32 = 4;
pub const EXIT_USER_INPUT: i32 = 5;

/// A single discriminated error kind, one per row of the closed taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum VillageError {
    /// Retryable failure (e.g. a subprocess timeout). Carries retry bookkeeping
    /// so callers and the CLI can report how much budget is left.
    #[error("{message} (attempt {attempt}/{max_attempts})")]
    Transient {
        message: String,
        attempt: u32,
        max_attempts: u32,
    },

    /// Invalid or missing configuration. Permanent; user must fix it.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bad CLI usage (not a configuration problem, a call-site problem).
    #[error("usage error: {0}")]
    UserInput(String),

    /// No work available / no admissible tasks for the operation requested.
    #[error("blocked: {0}")]
    Blocked(String),

    /// A lock file failed validation (corrupted or inconsistent with its path).
    #[error("lock validation error: {0}")]
    LockValidation(String),

    /// The user interrupted a resume operation mid-flight.
    #[error("interrupted: {0}")]
    Interrupted(String),

    /// A wrapped external-tool failure (git, the multiplexer, the ready-task
    /// source). Carries the failing command, its exit code, and a stderr tail.
    #[error("command failed (exit {exit_code:?}): {command}{}", format_stderr_tail(.stderr_tail))]
    SubprocessFailure {
        command: String,
        exit_code: Option<i32>,
        stderr_tail: String,
    },
}

fn format_stderr_tail(tail: &str) -> String {
    if tail.trim().is_empty() {
        String::new()
    } else {
        format!("\n{}", tail.trim_end())
    }
}

impl VillageError {
    /// The exit code this kind maps to under the closed exit-code taxonomy (§7).
    pub fn exit_code(&self) -> i32 {
        match self {
            VillageError::Transient { .. } | VillageError::Interrupted(_) => EXIT_TRANSIENT,
            VillageError::Config(_) | VillageError::LockValidation(_) => EXIT_ERROR,
            VillageError::UserInput(_) => EXIT_USER_INPUT,
            VillageError::Blocked(_) => EXIT_BLOCKED,
            VillageError::SubprocessFailure { .. } => EXIT_ERROR,
        }
    }

    /// Stable string tag for this kind, used in JSON renderings (§4.11).
    pub fn kind_tag(&self) -> &'static str {
        match self {
            VillageError::Transient { .. } => "transient",
            VillageError::Config(_) => "config",
            VillageError::UserInput(_) => "user-input",
            VillageError::Blocked(_) => "blocked",
            VillageError::LockValidation(_) => "lock-validation",
            VillageError::Interrupted(_) => "interrupted",
            VillageError::SubprocessFailure { .. } => "subprocess-failure",
        }
    }
}

/// Recover the exit code for an arbitrary `anyhow::Error` produced anywhere in
/// the core. Errors that never went through [`VillageError`] (a raw I/O error
/// bubbled up via `?`, say) fall back to the generic error exit code.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<VillageError>()
        .map_or(EXIT_ERROR, VillageError::exit_code)
}

/// Stable kind tag for an arbitrary error, `"error"` when not a [`VillageError`].
pub fn kind_tag_for(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<VillageError>()
        .map_or("error", VillageError::kind_tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_taxonomy() {
        assert_eq!(
            VillageError::Transient {
                message: "timeout".into(),
                attempt: 1,
                max_attempts: 3
            }
            .exit_code(),
            EXIT_TRANSIENT
        );
        assert_eq!(VillageError::Config("bad".into()).exit_code(), EXIT_ERROR);
        assert_eq!(
            VillageError::UserInput("bad flag".into()).exit_code(),
            EXIT_USER_INPUT
        );
        assert_eq!(VillageError::Blocked("nothing".into()).exit_code(), EXIT_BLOCKED);
        assert_eq!(
            VillageError::LockValidation("corrupt".into()).exit_code(),
            EXIT_ERROR
        );
        assert_eq!(
            VillageError::Interrupted("ctrl-c".into()).exit_code(),
            EXIT_TRANSIENT
        );
        assert_eq!(
            VillageError::SubprocessFailure {
                command: "git".into(),
                exit_code: Some(1),
                stderr_tail: String::new()
            }
            .exit_code(),
            EXIT_ERROR
        );
    }

    #[test]
    fn kind_tags_are_stable_strings() {
        assert_eq!(
            VillageError::Blocked("x".into()).kind_tag(),
            "blocked"
        );
        assert_eq!(
            VillageError::SubprocessFailure {
                command: "tmux".into(),
                exit_code: None,
                stderr_tail: String::new()
            }
            .kind_tag(),
            "subprocess-failure"
        );
    }

    #[test]
    fn exit_code_for_falls_back_on_foreign_errors() {
        let err = anyhow::anyhow!("plain io-ish error");
        assert_eq!(exit_code_for(&err), EXIT_ERROR);
        assert_eq!(kind_tag_for(&err), "error");
    }

    #[test]
    fn exit_code_for_recovers_wrapped_kind() {
        let err = anyhow::Error::new(VillageError::Blocked("no ready tasks".into()));
        assert_eq!(exit_code_for(&err), EXIT_BLOCKED);
        assert_eq!(kind_tag_for(&err), "blocked");
    }
}
