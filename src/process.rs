//! Subprocess facade (C1): every external process call — git, the terminal
//! multiplexer, *ReadyTaskSource* — goes through one of two operations here.
//! Inputs are always argument vectors, never shell strings.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::errors::VillageError;

/// Every subprocess gets this much wall-clock time before it's killed and
/// reported as a transient failure.
const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of a subprocess invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == Some(0)
    }
}

/// Abstraction over process execution so that callers (C2, C4, the Scm
/// backend) never touch `std::process::Command` directly — this is what
/// makes lock/queue/worktree logic unit-testable without a real `tmux`.
pub trait ProcessRunner: Send + Sync {
    /// Run `cmd` (argv[0] + args) with an optional working directory, always
    /// capturing stdout/stderr. Returns the raw outcome; does not interpret
    /// exit status as success or failure.
    fn run(&self, cmd: &[&str], cwd: Option<&Path>) -> Result<CommandOutput>;

    /// Run `cmd` and require a zero exit; on failure returns
    /// [`VillageError::SubprocessFailure`] with a stderr tail.
    /// Returns trimmed stdout on success.
    fn run_output(&self, cmd: &[&str], cwd: Option<&Path>) -> Result<String> {
        let output = self.run(cmd, cwd)?;
        if !output.success() {
            return Err(VillageError::SubprocessFailure {
                command: cmd.join(" "),
                exit_code: output.status_code,
                stderr_tail: stderr_tail(&output.stderr),
            }
            .into());
        }
        Ok(output.stdout.trim().to_string())
    }
}

/// Keep only the last few lines of stderr so error messages stay readable.
fn stderr_tail(stderr: &str) -> String {
    const MAX_LINES: usize = 10;
    let lines: Vec<&str> = stderr.lines().collect();
    if lines.len() <= MAX_LINES {
        stderr.trim_end().to_string()
    } else {
        lines[lines.len() - MAX_LINES..].join("\n")
    }
}

/// Shells out for real via `std::process::Command`.
pub struct RealProcessRunner;

impl ProcessRunner for RealProcessRunner {
    fn run(&self, cmd: &[&str], cwd: Option<&Path>) -> Result<CommandOutput> {
        let [program, args @ ..] = cmd else {
            return Err(VillageError::UserInput("empty command vector".into()).into());
        };

        let mut command = Command::new(program);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        tracing::debug!(cmd = %cmd.join(" "), "running subprocess");
        let mut child = command.spawn().map_err(|e| VillageError::SubprocessFailure {
            command: cmd.join(" "),
            exit_code: None,
            stderr_tail: e.to_string(),
        })?;

        // Drain stdout/stderr concurrently so a chatty child can't deadlock on
        // a full pipe buffer while we're polling its exit status below.
        let mut child_stdout = child.stdout.take();
        let mut child_stderr = child.stderr.take();
        let stdout_handle = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = child_stdout.as_mut() {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });
        let stderr_handle = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(pipe) = child_stderr.as_mut() {
                let _ = pipe.read_to_end(&mut buf);
            }
            buf
        });

        let start = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait().map_err(|e| VillageError::SubprocessFailure {
                command: cmd.join(" "),
                exit_code: None,
                stderr_tail: e.to_string(),
            })? {
                break Some(status);
            }
            if start.elapsed() >= SUBPROCESS_TIMEOUT {
                break None;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let Some(status) = status else {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Err(VillageError::Transient {
                message: format!("command '{}' timed out after {}s", cmd.join(" "), SUBPROCESS_TIMEOUT.as_secs()),
                attempt: 1,
                max_attempts: 1,
            }
            .into());
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        Ok(CommandOutput {
            status_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

/// Scripted responses for unit tests that exercise C2/C4/C8/C9 logic without
/// a real `tmux` or `git` binary. Responses are keyed by argv prefix so a
/// test can script `["tmux", "list-panes"]` without caring about the rest of
/// the invocation.
#[cfg(test)]
pub mod fake {
    use super::{CommandOutput, ProcessRunner};
    use anyhow::Result;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    pub struct ScriptedResponse {
        pub prefix: Vec<String>,
        pub output: CommandOutput,
    }

    #[derive(Default)]
    pub struct FakeProcessRunner {
        responses: Mutex<Vec<ScriptedResponse>>,
        pub calls: Mutex<Vec<(Vec<String>, Option<PathBuf>)>>,
    }

    impl FakeProcessRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(&self, prefix: &[&str], status_code: Option<i32>, stdout: &str, stderr: &str) {
            self.responses.lock().unwrap().push(ScriptedResponse {
                prefix: prefix.iter().map(|s| (*s).to_string()).collect(),
                output: CommandOutput {
                    status_code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                },
            });
        }

        pub fn script_ok(&self, prefix: &[&str], stdout: &str) {
            self.script(prefix, Some(0), stdout, "");
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ProcessRunner for FakeProcessRunner {
        fn run(&self, cmd: &[&str], cwd: Option<&Path>) -> Result<CommandOutput> {
            self.calls.lock().unwrap().push((
                cmd.iter().map(|s| (*s).to_string()).collect(),
                cwd.map(Path::to_path_buf),
            ));
            let responses = self.responses.lock().unwrap();
            for scripted in responses.iter().rev() {
                if cmd.len() >= scripted.prefix.len()
                    && cmd
                        .iter()
                        .zip(scripted.prefix.iter())
                        .all(|(a, b)| *a == b.as_str())
                {
                    return Ok(scripted.output.clone());
                }
            }
            Ok(CommandOutput {
                status_code: Some(1),
                stdout: String::new(),
                stderr: format!("no scripted response for: {}", cmd.join(" ")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeProcessRunner;
    use super::*;

    #[test]
    fn run_output_trims_and_returns_stdout() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["git", "rev-parse"], "  /repo/root  \n");
        let out = runner
            .run_output(&["git", "rev-parse", "--show-toplevel"], None)
            .unwrap();
        assert_eq!(out, "/repo/root");
    }

    #[test]
    fn run_output_fails_on_nonzero_exit() {
        let runner = FakeProcessRunner::new();
        runner.script(&["git", "worktree"], Some(128), "", "fatal: already exists\n");
        let err =
            runner.run_output(&["git", "worktree", "add", "x"], None).unwrap_err();
        let kind = err.downcast_ref::<VillageError>().unwrap();
        assert_eq!(kind.kind_tag(), "subprocess-failure");
    }

    #[test]
    fn last_scripted_match_wins() {
        let runner = FakeProcessRunner::new();
        runner.script_ok(&["tmux", "has-session"], "first");
        runner.script_ok(&["tmux", "has-session"], "second");
        let out = runner.run_output(&["tmux", "has-session", "-t", "x"], None).unwrap();
        assert_eq!(out, "second");
    }

    #[test]
    fn stderr_tail_truncates_long_output() {
        let long = (0..20).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = stderr_tail(&long);
        assert_eq!(tail.lines().count(), 10);
        assert!(tail.starts_with("line 10"));
    }
}
