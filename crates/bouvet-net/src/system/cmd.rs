//! Command execution used by the network manager.

use crate::error::{NetError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Maximum captured output per stream in bytes (1 MB).
const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code (-1 if killed by a signal).
    pub exit_code: i32,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecResult {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Returns true if the command exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, for error messages.
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            stdout.to_string()
        } else if stdout.is_empty() {
            stderr.to_string()
        } else {
            format!("{}\n{}", stdout, stderr)
        }
    }
}

/// Render a program and its arguments as one line for logs and errors.
pub fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs OS commands.
///
/// Implemented by [`OsCmdRunner`] for the guest and by
/// `FakeCmdRunner` in tests.
#[async_trait]
pub trait CmdRunner: Send + Sync {
    /// Run `program` with `args` and capture its output.
    ///
    /// Returns `Err` only when the command could not be started; a non-zero
    /// exit is reported through [`ExecResult::exit_code`].
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Returns true if `name` resolves to an executable on `PATH`.
    fn command_exists(&self, name: &str) -> bool;

    /// Run a command and fail on non-zero exit, returning stdout.
    async fn run_checked(&self, program: &str, args: &[&str]) -> Result<String> {
        let result = self.run_command(program, args).await?;
        if result.success() {
            Ok(result.stdout)
        } else {
            Err(NetError::CommandFailed {
                command: command_line(program, args),
                exit_code: result.exit_code,
                output: result.combined_output(),
            })
        }
    }
}

/// Truncate a string to max bytes, preserving UTF-8 boundaries.
fn truncate_output(s: String, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_string();
    truncated.push_str("\n... [output truncated]");
    truncated
}

/// [`CmdRunner`] that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsCmdRunner;

impl OsCmdRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CmdRunner for OsCmdRunner {
    async fn run_command(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let cmd = command_line(program, args);
        debug!(cmd = %cmd, "executing command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                warn!(error = %e, cmd = %cmd, "command execution failed");
                NetError::CommandSpawn {
                    command: cmd.clone(),
                    source: e,
                }
            })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = truncate_output(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            MAX_OUTPUT_SIZE,
        );
        let stderr = truncate_output(
            String::from_utf8_lossy(&output.stderr).into_owned(),
            MAX_OUTPUT_SIZE,
        );
        debug!(cmd = %cmd, exit_code = exit_code, "command completed");
        trace!(stdout = %stdout, stderr = %stderr, "command output");

        Ok(ExecResult {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn command_exists(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}
