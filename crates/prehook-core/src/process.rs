//! External process execution under a deadline.
//!
//! Every tool prehook talks to (git, make, the validators) is invoked through
//! the [`CommandRunner`] trait so the orchestration layer can be driven by
//! scripted fakes in tests.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::deadline::Deadline;
use crate::error::{PrehookError, Result};

/// A fully described command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments, excluding the program.
    pub args: Vec<String>,

    /// Working directory (inherits the current one when `None`).
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// `program arg1 arg2` for display in messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of one process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal or by the deadline.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Whether the deadline expired before the process finished.
    pub timed_out: bool,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// A successful run with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    /// A run that exited with `code`.
    pub fn failed(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            duration_ms: 0,
        }
    }

    /// A run killed because its deadline expired.
    pub fn timed_out() -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
            duration_ms: 0,
        }
    }

    /// Whether the process exited with status 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Backend that runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `cmd` to completion or until `deadline` expires.
    ///
    /// Expiry is reported through [`ProcessOutput::timed_out`], not as an error;
    /// errors are reserved for processes that could not be started at all.
    async fn run(&self, cmd: &CommandSpec, deadline: Deadline) -> Result<ProcessOutput>;
}

/// [`CommandRunner`] backed by `tokio::process`.
///
/// Children are spawned with `kill_on_drop`, so dropping the future (parent
/// timeout, task abort) kills the process rather than abandoning it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, cmd: &CommandSpec, deadline: Deadline) -> Result<ProcessOutput> {
        let start = Instant::now();

        if deadline.is_expired() {
            tracing::debug!(command = %cmd.display(), "deadline already expired, not spawning");
            return Ok(ProcessOutput::timed_out());
        }

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| PrehookError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

        let output = match deadline.remaining() {
            Some(left) => match tokio::time::timeout(left, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    tracing::debug!(command = %cmd.display(), "process killed at deadline");
                    let mut out = ProcessOutput::timed_out();
                    out.duration_ms = start.elapsed().as_millis() as u64;
                    return Ok(out);
                }
            },
            None => child.wait_with_output().await?,
        };

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            timed_out: false,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
