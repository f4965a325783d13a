//! One-shot dependency repair after a failed command.

use std::path::Path;

use tracing::{info, instrument, warn};

use crate::core::command::CommandText;
use crate::error::{ExecutionError, RepairError};
use crate::io::executor::Executor;
use crate::io::prompt::PromptEngine;
use crate::io::suggester::{Conversation, Suggester};

/// Result of a repair whose install command was obtained and run once.
#[derive(Debug)]
pub struct RepairAttempt {
    pub command: CommandText,
    /// Outcome of the install run. Never repaired further.
    pub install: Result<(), ExecutionError>,
}

/// Asks the suggester for an install command and runs it in the failing directory.
pub struct DependencyRepairer<'a, S, E> {
    suggester: &'a S,
    executor: &'a E,
    prompts: &'a PromptEngine,
    platform: &'a str,
}

impl<'a, S: Suggester, E: Executor> DependencyRepairer<'a, S, E> {
    pub fn new(suggester: &'a S, executor: &'a E, prompts: &'a PromptEngine) -> Self {
        Self {
            suggester,
            executor,
            prompts,
            platform: std::env::consts::OS,
        }
    }

    /// Platform name embedded in repair prompts (defaults to the host OS).
    pub fn with_platform(mut self, platform: &'a str) -> Self {
        self.platform = platform;
        self
    }

    #[instrument(skip_all, fields(directory = %directory.display(), platform = self.platform))]
    pub fn repair(
        &self,
        directory: &Path,
        failed_command: &str,
        error_text: &str,
        conversation: &mut Conversation,
    ) -> Result<RepairAttempt, RepairError> {
        let prompt = self
            .prompts
            .render_repair(failed_command, error_text, self.platform)
            .map_err(|e| RepairError::Prompt(format!("{e:#}")))?;

        let raw = self.suggester.suggest(&prompt, conversation)?;
        let command = CommandText::from_suggestion(&raw).ok_or(RepairError::EmptySuggestion)?;

        info!(command = %command, "installing dependencies");
        let install = self.executor.run(directory, command.as_str());
        if let Err(err) = &install {
            warn!(err = %err, "dependency install failed");
        }
        Ok(RepairAttempt { command, install })
    }
}
