//! Success policy on top of the raw command runner.
//!
//! [`lineage_vcs::CommandRunner`] only reports what happened. `Tool` decides
//! what counts as failure and turns it into the domain taxonomy: a timeout
//! becomes [`LineageError::CommandTimeout`], a nonzero exit becomes
//! [`LineageError::CommandFailed`] carrying the rendered command and stderr.

use std::sync::Arc;

use lineage_vcs::{CommandOutput, CommandRunner, GitCommands, Invocation};

use crate::domain::{LineageError, Result};
use crate::obs;

#[derive(Clone)]
pub struct Tool {
    runner: Arc<dyn CommandRunner>,
    git: GitCommands,
}

impl Tool {
    pub fn new(runner: Arc<dyn CommandRunner>, git: GitCommands) -> Self {
        Self { runner, git }
    }

    /// Argument builders for this dataset.
    pub fn git(&self) -> &GitCommands {
        &self.git
    }

    /// Run once. Only a timeout is an error; exit codes are left to the caller.
    pub async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.runner.run(invocation).await?;
        if output.timed_out {
            let timeout_ms = invocation.timeout.as_millis() as u64;
            let command = invocation.render();
            obs::emit_command_timed_out(invocation.operation, &command, timeout_ms);
            return Err(LineageError::CommandTimeout {
                operation: invocation.operation,
                command,
                timeout_ms,
            });
        }
        Ok(output)
    }

    /// Run once and require exit code 0.
    pub async fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation).await?;
        if output.exit_code != Some(0) {
            return Err(failed(invocation, &output));
        }
        Ok(output)
    }
}

/// Build the `CommandFailed` error for a finished invocation.
pub(crate) fn failed(invocation: &Invocation, output: &CommandOutput) -> LineageError {
    LineageError::CommandFailed {
        operation: invocation.operation,
        command: invocation.render(),
        exit_code: output.exit_code,
        stderr: output.stderr.trim().to_string(),
    }
}
