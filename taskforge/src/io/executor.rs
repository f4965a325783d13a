//! Executor abstraction for running shell commands in a project directory.
//!
//! The [`Executor`] trait decouples orchestration from process spawning. Tests
//! use scripted executors that return predetermined results without spawning
//! processes.

use std::path::Path;
use std::process::Command;

use tracing::{debug, info, instrument, warn};

use crate::error::ExecutionError;
use crate::io::process::{Echo, run_command_streaming};

/// Abstraction over command execution backends.
pub trait Executor {
    /// Run `command` with `directory` as working directory.
    ///
    /// Returns `ExecutionError::Failed` with the captured output on a non-zero
    /// exit, or `ExecutionError::Spawn` when the command cannot be started.
    fn run(&self, directory: &Path, command: &str) -> Result<(), ExecutionError>;
}

impl<T: Executor + ?Sized> Executor for &T {
    fn run(&self, directory: &Path, command: &str) -> Result<(), ExecutionError> {
        (**self).run(directory, command)
    }
}

/// Executor that runs commands through `<shell> -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    output_limit_bytes: usize,
    echo: Echo,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            shell: shell.into(),
            output_limit_bytes,
            echo: Echo::Console,
        }
    }

    /// Capture output without echoing it to the console.
    pub fn silent(mut self) -> Self {
        self.echo = Echo::Silent;
        self
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("bash", 100_000)
    }
}

impl Executor for ShellExecutor {
    #[instrument(skip_all, fields(directory = %directory.display(), shell = %self.shell))]
    fn run(&self, directory: &Path, command: &str) -> Result<(), ExecutionError> {
        info!(command = command.trim_end(), "running command");
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(command).current_dir(directory);

        let output = run_command_streaming(cmd, self.output_limit_bytes, self.echo).map_err(
            |source| ExecutionError::Spawn {
                command: command.trim_end().to_string(),
                source,
            },
        )?;

        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "command failed");
            return Err(ExecutionError::Failed {
                code: output.status.code(),
                output: output.combined_lossy(),
            });
        }

        debug!("command completed successfully");
        Ok(())
    }
}
