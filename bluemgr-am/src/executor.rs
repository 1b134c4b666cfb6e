//! External command execution
//!
//! Every interaction with the Bluetooth stack and the audio server goes
//! through a [`CommandRunner`]. The runner never interprets output: it only
//! classifies how the process ended. Callers branch on [`CommandOutcome`].

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Program plus arguments, executed without a shell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
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

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// How an external command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exit status zero, combined stdout/stderr
    Ok(String),
    /// Non-zero exit or spawn failure, combined stdout/stderr (or OS error)
    Failed(String),
    TimedOut,
}

impl CommandOutcome {
    /// Output text, if the process produced any (success or failure)
    pub fn text(&self) -> Option<&str> {
        match self {
            CommandOutcome::Ok(text) | CommandOutcome::Failed(text) => Some(text),
            CommandOutcome::TimedOut => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandOutcome::Ok(_))
    }

    /// Convert into the error taxonomy for callers that require success
    pub fn into_result(self, command: &CommandLine) -> Result<String> {
        match self {
            CommandOutcome::Ok(text) => Ok(text),
            CommandOutcome::Failed(output) => Err(Error::CommandFailed {
                command: command.to_string(),
                output: output.trim().to_string(),
            }),
            CommandOutcome::TimedOut => Err(Error::CommandTimeout {
                command: command.to_string(),
            }),
        }
    }
}

/// Executes external commands
///
/// Implementations must be safe to share between the arbitrator task and
/// request handlers. Callers serialize their own usage.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion (bounded by the runner's timeout)
    async fn execute(&self, command: &CommandLine) -> CommandOutcome;

    /// Start without waiting and without reporting an outcome
    fn spawn_detached(&self, command: &CommandLine);
}

/// [`CommandRunner`] backed by real OS processes
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, command: &CommandLine) -> CommandOutcome {
        debug!(command = %command, "Executing");

        let child = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child is dropped with the future and must not linger
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command, "Failed to spawn: {}", e);
                return CommandOutcome::Failed(format!(
                    "failed to spawn {}: {}",
                    command.program(),
                    e
                ));
            }
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs_f32(), "Command timed out");
                CommandOutcome::TimedOut
            }
            Ok(Err(e)) => CommandOutcome::Failed(e.to_string()),
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));

                if output.status.success() {
                    CommandOutcome::Ok(text)
                } else {
                    debug!(command = %command, status = ?output.status, "Command exited non-zero");
                    CommandOutcome::Failed(text)
                }
            }
        }
    }

    fn spawn_detached(&self, command: &CommandLine) {
        debug!(command = %command, "Spawning detached");

        let spawned = Command::new(command.program())
            .args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                // Reap in the background so the child does not stay a zombie
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
            Err(e) => warn!(command = %command, "Failed to spawn detached command: {}", e),
        }
    }
}
