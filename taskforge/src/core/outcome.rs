//! Terminal result of one orchestrated run.

use crate::core::command::CommandText;

/// Which failure class ended an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Generation,
    Execution,
    DependencyRepair,
}

/// Outcome returned by `Orchestrator::run`. Never retried beyond the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success {
        command: CommandText,
    },
    GenerationFailed {
        attempts: u32,
        last_error: String,
    },
    ExecutionFailed {
        command: String,
        attempts: u32,
        last_error: String,
    },
    DependencyRepairFailed {
        command: String,
        attempts: u32,
        last_error: String,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    /// Build the failure outcome for the class that ended the last attempt.
    pub fn failed(
        class: FailureClass,
        command: Option<&str>,
        attempts: u32,
        last_error: String,
    ) -> Self {
        let command = command.map(|c| c.trim_end().to_string()).unwrap_or_default();
        match class {
            FailureClass::Generation => RunOutcome::GenerationFailed {
                attempts,
                last_error,
            },
            FailureClass::Execution => RunOutcome::ExecutionFailed {
                command,
                attempts,
                last_error,
            },
            FailureClass::DependencyRepair => RunOutcome::DependencyRepairFailed {
                command,
                attempts,
                last_error,
            },
        }
    }

    /// Last concrete error, if the run failed.
    pub fn last_error(&self) -> Option<&str> {
        match self {
            RunOutcome::Success { .. } => None,
            RunOutcome::GenerationFailed { last_error, .. }
            | RunOutcome::ExecutionFailed { last_error, .. }
            | RunOutcome::DependencyRepairFailed { last_error, .. } => Some(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_picks_variant_by_class() {
        let out = RunOutcome::failed(FailureClass::Execution, Some("make\n"), 3, "exit 2".into());
        assert_eq!(
            out,
            RunOutcome::ExecutionFailed {
                command: "make".to_string(),
                attempts: 3,
                last_error: "exit 2".to_string(),
            }
        );
        assert_eq!(out.last_error(), Some("exit 2"));
        assert!(!out.is_success());

        let out = RunOutcome::failed(FailureClass::Generation, None, 2, "blank".into());
        assert!(matches!(out, RunOutcome::GenerationFailed { attempts: 2, .. }));
    }
}
