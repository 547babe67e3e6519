//! Process Executor
//!
//! Runs host programs with `tokio::process` and captures their output.

use crate::domain::ports::{CommandOutput, SystemCommand, SystemExecutor};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

/// Executor backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SystemExecutor for ProcessExecutor {
    async fn run(&self, command: &SystemCommand) -> Result<CommandOutput> {
        debug!("Running: {}", command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::CommandSpawn {
                program: command.program.clone(),
                reason: e.to_string(),
            })?;

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        trace!(
            status = result.status,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "{} finished",
            command.program
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_captures_stdout_and_status() {
        let exec = ProcessExecutor::new();
        let out = exec
            .run(&SystemCommand::new("sh").args(["-c", "echo hello; exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_checked_maps_failure() {
        let exec = ProcessExecutor::new();
        let err = exec
            .run_checked(&SystemCommand::new("sh").args(["-c", "echo boom >&2; exit 1"]))
            .await
            .unwrap_err();
        assert_matches!(err, Error::CommandFailed { status: 1, ref stderr, .. } if stderr == "boom");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let exec = ProcessExecutor::new();
        let err = exec
            .run(&SystemCommand::new("definitely-not-a-real-program-xyz"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::CommandSpawn { .. });
    }
}
