//! Store lookup, generation, execution and repair for one task run.
//!
//! ```text
//! Lookup ─┬─ stored ──> ExecuteStored ─────────────┬─> Success
//!         └─ absent ──> Generate ──> Execute ──────┤
//!                          ^            │ failure  │
//!                          │            v          │
//!                          └──── Repair ──> Rerun ─┴─> Retry | Fail
//! ```
//!
//! The only state that survives a [`Orchestrator::run`] call is the command
//! store. Progress is reported through [`RunEvent`]s so the CLI can print it
//! without the engine knowing about terminals.

use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::command::CommandText;
use crate::core::outcome::{FailureClass, RunOutcome};
use crate::core::policy::RetryPolicy;
use crate::core::task::Task;
use crate::error::{ExecutionError, GenerationError, PersistenceError, SuggestError};
use crate::io::executor::Executor;
use crate::io::files::list_files;
use crate::io::prompt::PromptEngine;
use crate::io::store::CommandStore;
use crate::io::suggester::{Conversation, Suggester};
use crate::repair::DependencyRepairer;

/// Progress notification emitted while a run advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    UsingStored { command: String },
    GenerationAttempt { attempt: u32, max: u32 },
    GenerationFailed { attempt: u32, error: String },
    CommandGenerated { command: String },
    ExecutionAttempt { attempt: u32, max: u32, command: String },
    ExecutionFailed { attempt: u32, error: String },
    RepairCommand { command: String },
    RepairFailed { error: String },
    InstallFailed { error: String },
    Rerun { attempt: u32, command: String },
    Persisted { task: String },
    Succeeded { command: String },
}

/// Why one attempt ended, kept so exhaustion can report the last real error.
#[derive(Debug)]
struct AttemptFailure {
    class: FailureClass,
    message: String,
}

impl AttemptFailure {
    fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }
}

/// The command orchestration engine.
///
/// One instance serves one CLI invocation; its [`Conversation`] is shared by
/// every suggester call it makes (generation, repair, and [`Self::suggest`]).
pub struct Orchestrator<'a, S, E, C> {
    suggester: S,
    executor: E,
    store: C,
    prompts: PromptEngine,
    max_listed_files: usize,
    platform: String,
    conversation: Conversation,
    on_event: Box<dyn FnMut(&RunEvent) + 'a>,
}

impl<'a, S: Suggester, E: Executor, C: CommandStore> Orchestrator<'a, S, E, C> {
    pub fn new(suggester: S, executor: E, store: C) -> Result<Self> {
        Ok(Self {
            suggester,
            executor,
            store,
            prompts: PromptEngine::new()?,
            max_listed_files: 400,
            platform: std::env::consts::OS.to_string(),
            conversation: Conversation::new(),
            on_event: Box::new(|_| {}),
        })
    }

    pub fn with_max_listed_files(mut self, limit: usize) -> Self {
        self.max_listed_files = limit;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Register the progress callback.
    pub fn on_event(mut self, on_event: impl FnMut(&RunEvent) + 'a) -> Self {
        self.on_event = Box::new(on_event);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Ask the suggester directly within this run's conversation.
    pub fn suggest(&mut self, prompt: &str) -> Result<String, SuggestError> {
        self.suggester.suggest(prompt, &mut self.conversation)
    }

    pub fn prompts(&self) -> &PromptEngine {
        &self.prompts
    }

    /// Run `task` in `directory` under `policy`.
    ///
    /// Only persistence failures are errors; every other failure is folded
    /// into the returned [`RunOutcome`].
    #[instrument(skip_all, fields(task = %task, directory = %directory.display(), conversation = %self.conversation.id()))]
    pub fn run(
        &mut self,
        task: &Task,
        directory: &Path,
        policy: &RetryPolicy,
    ) -> Result<RunOutcome, PersistenceError> {
        if let Some(stored) = self.store.get(directory, task)? {
            info!(command = %stored, "using stored command");
            self.emit(RunEvent::UsingStored {
                command: stored.to_string(),
            });
            let outcome = match self.execute_with_retry(directory, &stored, policy) {
                Ok(()) => {
                    self.emit(RunEvent::Succeeded {
                        command: stored.to_string(),
                    });
                    RunOutcome::Success { command: stored }
                }
                // A failed repair of a stored command is still an execution failure.
                Err(failure) => RunOutcome::failed(
                    FailureClass::Execution,
                    Some(stored.as_str()),
                    policy.execute_attempts,
                    failure.message,
                ),
            };
            return Ok(outcome);
        }

        self.generate_and_execute(task, directory, policy)
    }

    fn generate_and_execute(
        &mut self,
        task: &Task,
        directory: &Path,
        policy: &RetryPolicy,
    ) -> Result<RunOutcome, PersistenceError> {
        let max = policy.generate_attempts;
        let mut last_failure = AttemptFailure::new(
            FailureClass::Generation,
            "generation budget is zero; no command requested",
        );
        let mut last_command: Option<CommandText> = None;

        for attempt in 1..=max {
            if attempt > 1 {
                policy.pause();
            }
            self.emit(RunEvent::GenerationAttempt { attempt, max });

            let command = match self.generate(task, directory) {
                Ok(command) => command,
                Err(err) => {
                    warn!(attempt, err = %err, "generation failed");
                    self.emit(RunEvent::GenerationFailed {
                        attempt,
                        error: err.to_string(),
                    });
                    last_failure = AttemptFailure::new(FailureClass::Generation, err.to_string());
                    last_command = None;
                    continue;
                }
            };
            self.emit(RunEvent::CommandGenerated {
                command: command.to_string(),
            });

            match self.execute_with_retry(directory, &command, policy) {
                Ok(()) => {
                    self.store.set(directory, task, &command)?;
                    self.emit(RunEvent::Persisted {
                        task: task.name().to_string(),
                    });
                    self.emit(RunEvent::Succeeded {
                        command: command.to_string(),
                    });
                    return Ok(RunOutcome::Success { command });
                }
                Err(failure) => {
                    debug!(attempt, "generated command exhausted its execution budget");
                    last_failure = failure;
                    last_command = Some(command);
                }
            }
        }

        Ok(RunOutcome::failed(
            last_failure.class,
            last_command.as_ref().map(CommandText::as_str),
            max,
            last_failure.message,
        ))
    }

    /// List files, render the task prompt and fence-strip the completion.
    fn generate(&mut self, task: &Task, directory: &Path) -> Result<CommandText, GenerationError> {
        let (files, omitted) =
            list_files(directory, self.max_listed_files).map_err(|e| GenerationError::FileList {
                path: directory.to_path_buf(),
                message: format!("{e:#}"),
            })?;
        let prompt = self
            .prompts
            .render_generation(task, &files, omitted)
            .map_err(|e| GenerationError::Prompt(format!("{e:#}")))?;

        let raw = self.suggester.suggest(&prompt, &mut self.conversation)?;
        CommandText::from_suggestion(&raw).ok_or(GenerationError::Blank)
    }

    /// Execution-retry sub-loop: run, repair once, rerun the original command.
    fn execute_with_retry(
        &mut self,
        directory: &Path,
        command: &CommandText,
        policy: &RetryPolicy,
    ) -> Result<(), AttemptFailure> {
        let max = policy.execute_attempts;
        let mut last_failure = AttemptFailure::new(
            FailureClass::Execution,
            "execution budget is zero; command not run",
        );

        for attempt in 1..=max {
            if attempt > 1 {
                policy.pause();
            }
            self.emit(RunEvent::ExecutionAttempt {
                attempt,
                max,
                command: command.to_string(),
            });

            let err = match self.executor.run(directory, command.as_str()) {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };
            self.emit(RunEvent::ExecutionFailed {
                attempt,
                error: err.to_string(),
            });

            match self.repair_and_rerun(directory, command, attempt, &err) {
                Ok(()) => return Ok(()),
                Err(failure) => last_failure = failure,
            }
        }

        Err(last_failure)
    }

    fn repair_and_rerun(
        &mut self,
        directory: &Path,
        command: &CommandText,
        attempt: u32,
        err: &ExecutionError,
    ) -> Result<(), AttemptFailure> {
        let repaired = DependencyRepairer::new(&self.suggester, &self.executor, &self.prompts)
            .with_platform(&self.platform)
            .repair(
                directory,
                command.as_str(),
                &err.diagnostic(),
                &mut self.conversation,
            );

        let repair = match repaired {
            Ok(repair) => repair,
            Err(repair_err) => {
                warn!(err = %repair_err, "dependency repair failed");
                self.emit(RunEvent::RepairFailed {
                    error: repair_err.to_string(),
                });
                return Err(AttemptFailure::new(
                    FailureClass::DependencyRepair,
                    format!("{repair_err} (after: {err})"),
                ));
            }
        };

        self.emit(RunEvent::RepairCommand {
            command: repair.command.to_string(),
        });
        if let Err(install_err) = &repair.install {
            self.emit(RunEvent::InstallFailed {
                error: install_err.to_string(),
            });
        }

        self.emit(RunEvent::Rerun {
            attempt,
            command: command.to_string(),
        });
        match self.executor.run(directory, command.as_str()) {
            Ok(()) => Ok(()),
            Err(rerun_err) => {
                self.emit(RunEvent::ExecutionFailed {
                    attempt,
                    error: rerun_err.to_string(),
                });
                Err(AttemptFailure::new(
                    FailureClass::Execution,
                    rerun_err.diagnostic(),
                ))
            }
        }
    }

    fn emit(&mut self, event: RunEvent) {
        (self.on_event)(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use crate::test_support::{EventLog, MemoryStore, ScriptedExecutor, ScriptedSuggester};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::uniform(attempts, Duration::ZERO)
    }

    #[test]
    fn zero_generation_budget_never_calls_suggester() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["make"]);
        let executor = ScriptedExecutor::succeed_on(&["make"]);
        let store = MemoryStore::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let outcome = orch.run(&Task::Build, temp.path(), &policy(0)).expect("run");
        assert!(matches!(outcome, RunOutcome::GenerationFailed { attempts: 0, .. }));
        assert_eq!(suggester.calls(), 0);
    }

    #[test]
    fn zero_execution_budget_never_calls_executor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["make"]);
        let executor = ScriptedExecutor::succeed_on(&["make"]);
        let store = MemoryStore::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let outcome = orch
            .run(&Task::Build, temp.path(), &policy(1).with_execute_attempts(0))
            .expect("run");
        assert!(matches!(outcome, RunOutcome::ExecutionFailed { ref command, .. } if command == "make"));
        assert!(executor.calls().is_empty());
        assert_eq!(store.get_raw(temp.path(), &Task::Build), None);
    }

    #[test]
    fn repair_then_rerun_succeeds_within_one_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["cargo build", "rustup default stable"]);
        let executor = ScriptedExecutor::new(|command, seen| match command {
            "cargo build" if seen == 0 => Err(ScriptedExecutor::failure("no toolchain")),
            _ => Ok(()),
        });
        let store = MemoryStore::default();
        let log = EventLog::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store)
            .expect("orchestrator")
            .with_platform("linux")
            .on_event(log.recorder());

        let outcome = orch.run(&Task::Build, temp.path(), &policy(1)).expect("run");
        assert!(outcome.is_success());
        assert_eq!(
            executor.calls(),
            vec!["cargo build", "rustup default stable", "cargo build"]
        );
        assert_eq!(
            store.get_raw(temp.path(), &Task::Build).as_deref(),
            Some("cargo build\n")
        );
        assert!(log.events().contains(&RunEvent::RepairCommand {
            command: "rustup default stable".to_string()
        }));
        assert_eq!(orch.conversation().messages().len(), 4);
    }

    #[test]
    fn last_attempt_repair_failure_selects_repair_outcome() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["make", "   "]);
        let executor = ScriptedExecutor::succeed_on(&[]);
        let store = MemoryStore::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let outcome = orch
            .run(&Task::Build, temp.path(), &policy(1))
            .expect("run");
        match outcome {
            RunOutcome::DependencyRepairFailed {
                command,
                attempts,
                last_error,
            } => {
                assert_eq!(command, "make");
                assert_eq!(attempts, 1);
                assert!(last_error.contains("received empty dependency command"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // No second execution when the repair produced nothing usable.
        assert_eq!(executor.calls(), vec!["make"]);
    }

    #[test]
    fn delay_separates_generation_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["", "", ""]);
        let executor = ScriptedExecutor::succeed_on(&[]);
        let store = MemoryStore::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let started = Instant::now();
        let outcome = orch
            .run(
                &Task::Build,
                temp.path(),
                &RetryPolicy::uniform(3, Duration::from_millis(40)),
            )
            .expect("run");

        assert!(matches!(outcome, RunOutcome::GenerationFailed { attempts: 3, .. }));
        // Two pauses for three attempts.
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn delay_separates_execution_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::default().with(temp.path(), Task::Test, "make test");
        let suggester = ScriptedSuggester::replies(["", ""]);
        let executor = ScriptedExecutor::succeed_on(&[]);
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let started = Instant::now();
        orch.run(
            &Task::Test,
            temp.path(),
            &RetryPolicy::uniform(2, Duration::from_millis(60)),
        )
        .expect("run");

        assert_eq!(executor.calls().len(), 2);
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn first_attempt_does_not_wait() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["make"]);
        let executor = ScriptedExecutor::succeed_on(&["make"]);
        let store = MemoryStore::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let started = Instant::now();
        let outcome = orch
            .run(
                &Task::Build,
                temp.path(),
                &RetryPolicy::uniform(3, Duration::from_secs(30)),
            )
            .expect("run");

        assert!(outcome.is_success());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn persistence_failure_escapes_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suggester = ScriptedSuggester::replies(["make"]);
        let executor = ScriptedExecutor::succeed_on(&["make"]);
        let store = MemoryStore::default().failing_writes();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        let err = orch.run(&Task::Build, temp.path(), &policy(2)).unwrap_err();
        assert!(matches!(err, PersistenceError::Write { .. }));
    }

    #[test]
    fn generation_prompt_lists_directory_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("main.go"), "package main\n").expect("write");
        let suggester = ScriptedSuggester::replies(["go build ./..."]);
        let executor = ScriptedExecutor::succeed_on(&["go build ./..."]);
        let store = MemoryStore::default();
        let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

        orch.run(&Task::Build, temp.path(), &policy(1)).expect("run");
        let prompt = &suggester.prompts()[0];
        assert!(prompt.contains("build the listed files"));
        assert!(prompt.contains("main.go"));
    }
}
