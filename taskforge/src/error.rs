//! Error taxonomy for the command orchestration engine.
//!
//! Generation, execution and repair errors are absorbed by the retry loops;
//! only [`PersistenceError`] escapes `Orchestrator::run`.

use std::path::PathBuf;

use thiserror::Error;

/// Failure talking to the suggestion service.
#[derive(Debug, Error)]
pub enum SuggestError {
    #[error("missing API key (set {0})")]
    MissingApiKey(String),

    #[error("suggester request failed: {0}")]
    Transport(String),

    #[error("suggester returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("suggester error: {0}")]
    Api(String),

    #[error("suggester response had no message content")]
    MissingContent,
}

/// The suggester could not produce a usable command.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Suggest(#[from] SuggestError),

    #[error("suggester returned a blank command")]
    Blank,

    #[error("list files in {}: {message}", .path.display())]
    FileList { path: PathBuf, message: String },

    #[error("render prompt: {0}")]
    Prompt(String),
}

/// A command failed to start or exited non-zero.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command exited with status {}", exit_label(.code))]
    Failed { code: Option<i32>, output: String },
}

impl ExecutionError {
    /// Diagnostic text for repair prompts: status line plus captured output.
    pub fn diagnostic(&self) -> String {
        match self {
            ExecutionError::Spawn { .. } => self.to_string(),
            ExecutionError::Failed { output, .. } => {
                let output = output.trim();
                if output.is_empty() {
                    self.to_string()
                } else {
                    format!("{self}\n{output}")
                }
            }
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "unknown (terminated by signal)".to_string(),
    }
}

/// The repair suggestion could not be obtained.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("dependency suggestion failed: {0}")]
    Suggest(#[from] SuggestError),

    #[error("received empty dependency command")]
    EmptySuggestion,

    #[error("render repair prompt: {0}")]
    Prompt(String),
}

/// The command store could not be read or written.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} already exists (use --force to overwrite)", .path.display())]
    AlreadyExists { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_includes_output() {
        let err = ExecutionError::Failed {
            code: Some(127),
            output: "sh: make: command not found\n".to_string(),
        };
        assert_eq!(
            err.diagnostic(),
            "command exited with status 127\nsh: make: command not found"
        );
    }

    #[test]
    fn diagnostic_without_output_is_status_only() {
        let err = ExecutionError::Failed {
            code: None,
            output: "  ".to_string(),
        };
        assert_eq!(
            err.diagnostic(),
            "command exited with status unknown (terminated by signal)"
        );
    }
}
