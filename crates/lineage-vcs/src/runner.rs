//! External command execution with a hard wall-clock timeout.
//!
//! A nonzero exit is not an error here: [`CommandRunner::run`] hands back the
//! exit code, stdout and stderr and lets the caller decide. A timeout is
//! reported through [`CommandOutput::timed_out`] after the child has been
//! killed and reaped.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{VcsError, VcsResult};
use crate::path_guard::PathGuard;

/// One fully specified tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Short operation label used in logs and surfaced errors.
    pub operation: &'static str,
    /// Executable name or path.
    pub program: String,
    /// Arguments, passed verbatim (never through a shell).
    pub args: Vec<String>,
    /// Working directory; must pass the runner's [`PathGuard`].
    pub working_dir: PathBuf,
    /// Hard wall-clock limit.
    pub timeout: Duration,
}

impl Invocation {
    /// Render as a single line for error messages.
    pub fn render(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                out.push_str(&format!("{arg:?}"));
            } else {
                out.push_str(arg);
            }
        }
        out
    }
}

/// Captured result of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the child was killed (timeout or signal).
    pub exit_code: Option<i32>,

    /// Raw stdout bytes (blob retrieval needs them unmodified).
    pub stdout: Vec<u8>,

    /// Captured stderr, lossily decoded.
    pub stderr: String,

    /// The timeout fired and the child was terminated.
    pub timed_out: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// A normal exit.
    pub fn exited(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    /// Shorthand for a successful exit with the given stdout.
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self::exited(0, stdout, "")
    }

    /// The synthetic timeout marker.
    pub fn timeout(duration_ms: u64) -> Self {
        Self {
            exit_code: None,
            stdout: Vec::new(),
            stderr: String::new(),
            timed_out: true,
            duration_ms,
        }
    }

    /// Exit code 0 and no timeout.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Stdout decoded lossily as UTF-8.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

/// Narrow seam over process spawning so higher layers depend only on
/// structured results (and can be driven by canned output in tests).
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one invocation to completion or timeout. Never retries.
    async fn run(&self, invocation: &Invocation) -> VcsResult<CommandOutput>;
}

/// Spawns real OS processes, one per call.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    guard: PathGuard,
}

impl ProcessRunner {
    /// Runner confined to the dataset root held by `guard`.
    pub fn new(guard: PathGuard) -> Self {
        Self { guard }
    }

    pub fn guard(&self) -> &PathGuard {
        &self.guard
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> VcsResult<CommandOutput> {
        let cwd = self.guard.resolve(&invocation.working_dir)?;
        debug!(
            operation = invocation.operation,
            command = %invocation.render(),
            "spawning tool"
        );

        let start = Instant::now();
        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(cwd.absolute())
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VcsError::Spawn {
                program: invocation.program.clone(),
                source,
            })?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout_task = tokio::spawn(read_all(child.stdout.take()));
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        match tokio::time::timeout(invocation.timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                let stdout = stdout_task.await.unwrap_or_default();
                let stderr = stderr_task.await.unwrap_or_default();
                Ok(CommandOutput {
                    exit_code: status.code(),
                    stdout,
                    stderr: String::from_utf8_lossy(&stderr).into_owned(),
                    timed_out: false,
                    duration_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    warn!(
                        operation = invocation.operation,
                        error = %e,
                        "failed to kill timed-out child"
                    );
                }
                stdout_task.abort();
                stderr_task.abort();
                let elapsed = start.elapsed().as_millis() as u64;
                warn!(
                    operation = invocation.operation,
                    command = %invocation.render(),
                    limit_ms = invocation.timeout.as_millis() as u64,
                    "tool timed out and was terminated"
                );
                Ok(CommandOutput::timeout(elapsed))
            }
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        if let Err(e) = reader.read_to_end(&mut buf).await {
            warn!(error = %e, "failed to read child output");
        }
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(dir: &std::path::Path, program: &str, args: &[&str], timeout_ms: u64) -> Invocation {
        Invocation {
            operation: "test",
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: dir.to_path_buf(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn render_quotes_whitespace_arguments() {
        let inv = Invocation {
            operation: "commit",
            program: "git".to_string(),
            args: vec!["commit".into(), "-m".into(), "two words".into()],
            working_dir: PathBuf::from("."),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(inv.render(), "git commit -m \"two words\"");
    }

    #[test]
    fn output_success_requires_zero_and_no_timeout() {
        assert!(CommandOutput::ok("x").success());
        assert!(!CommandOutput::exited(1, "", "boom").success());
        assert!(!CommandOutput::timeout(10).success());
        assert_eq!(CommandOutput::ok("hi").stdout_text(), "hi");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(PathGuard::new(dir.path()).unwrap());
        let out = runner
            .run(&invocation(dir.path(), "echo", &["hello"], 5_000))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_text().trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_returned_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(PathGuard::new(dir.path()).unwrap());
        let out = runner
            .run(&invocation(dir.path(), "sh", &["-c", "echo oops >&2; exit 3"], 5_000))
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.timed_out);
        assert!(out.stderr.contains("oops"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_child_and_marks_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(PathGuard::new(dir.path()).unwrap());
        let start = Instant::now();
        let out = runner
            .run(&invocation(dir.path(), "sleep", &["5"], 100))
            .await
            .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn working_dir_outside_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(PathGuard::new(dir.path()).unwrap());
        let err = runner
            .run(&invocation(other.path(), "echo", &["x"], 1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::PathEscape(_)));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(PathGuard::new(dir.path()).unwrap());
        let err = runner
            .run(&invocation(dir.path(), "definitely-not-a-real-binary-xyz", &[], 1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Spawn { .. }));
    }
}
