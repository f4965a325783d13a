//! End-to-end orchestrator scenarios with scripted collaborators.
//!
//! Covers stored-command reuse, fence stripping, blank-suggestion retries,
//! budgets and store isolation, using the real file-backed store where the
//! on-disk result matters.

use std::fs;
use std::time::Duration;

use taskforge::core::outcome::RunOutcome;
use taskforge::core::policy::RetryPolicy;
use taskforge::core::task::Task;
use taskforge::io::store::{CommandStore, FileCommandStore, load_store_file, store_path};
use taskforge::orchestrator::{Orchestrator, RunEvent};
use taskforge::test_support::{EventLog, MemoryStore, ScriptedExecutor, ScriptedSuggester, project};

fn policy(attempts: u32) -> RetryPolicy {
    RetryPolicy::uniform(attempts, Duration::ZERO)
}

#[test]
fn fenced_suggestion_is_stripped_and_persisted() {
    let temp = project(&[("hello.sh", "echo hello\n")]);
    let suggester = ScriptedSuggester::replies(["```\necho hello\n```"]);
    let executor = ScriptedExecutor::succeed_on(&["echo hello"]);
    let mut orch = Orchestrator::new(&suggester, &executor, FileCommandStore).expect("orchestrator");

    let outcome = orch.run(&Task::Build, temp.path(), &policy(3)).expect("run");

    match outcome {
        RunOutcome::Success { command } => assert_eq!(command.as_str(), "echo hello\n"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let stored = load_store_file(&store_path(temp.path())).expect("load");
    assert_eq!(stored.build_command, "echo hello\n");
    assert!(!stored.build_command.contains("```"));
}

#[test]
fn failing_stored_command_is_kept_after_exhaustion() {
    let temp = project(&[("Makefile", "all:\n")]);
    fs::write(store_path(temp.path()), "build-command = \"make\"\n").expect("seed store");
    let suggester = ScriptedSuggester::replies([
        "apt-get install -y make",
        "apt-get install -y make",
        "apt-get install -y make",
    ]);
    let executor = ScriptedExecutor::succeed_on(&[]);
    let mut orch = Orchestrator::new(&suggester, &executor, FileCommandStore).expect("orchestrator");

    let outcome = orch.run(&Task::Build, temp.path(), &policy(3)).expect("run");

    match outcome {
        RunOutcome::ExecutionFailed {
            command, attempts, ..
        } => {
            assert_eq!(command, "make");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    // One repair suggestion per failed attempt, never a generation request.
    assert_eq!(suggester.calls(), 3);
    assert!(suggester.prompts().iter().all(|p| p.contains("'make' failed")));
    // Each attempt: run, install, rerun original.
    assert_eq!(executor.calls().len(), 9);
    let stored = load_store_file(&store_path(temp.path())).expect("load");
    assert_eq!(stored.build_command, "make");
}

#[test]
fn blank_suggestion_is_retried_with_exactly_two_calls() {
    let temp = project(&[("main.go", "package main\n")]);
    let suggester = ScriptedSuggester::replies(["   \n", "go build ./..."]);
    let executor = ScriptedExecutor::succeed_on(&["go build ./..."]);
    let log = EventLog::default();
    let mut orch = Orchestrator::new(&suggester, &executor, FileCommandStore)
        .expect("orchestrator")
        .on_event(log.recorder());

    let outcome = orch.run(&Task::Build, temp.path(), &policy(3)).expect("run");

    assert!(outcome.is_success());
    assert_eq!(suggester.calls(), 2);
    assert_eq!(
        load_store_file(&store_path(temp.path()))
            .expect("load")
            .build_command,
        "go build ./...\n"
    );
    let events = log.events();
    assert!(matches!(
        events[1],
        RunEvent::GenerationFailed { attempt: 1, .. }
    ));
    assert!(events.contains(&RunEvent::Persisted {
        task: "build".to_string()
    }));
}

#[test]
fn stored_command_runs_without_consulting_suggester() {
    let temp = project(&[]);
    let suggester = ScriptedSuggester::replies(["make"]);
    let executor = ScriptedExecutor::succeed_on(&["make"]);
    let store = MemoryStore::default();
    let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

    assert!(orch.run(&Task::Test, temp.path(), &policy(2)).expect("first").is_success());
    assert_eq!(suggester.calls(), 1);
    assert_eq!(store.writes(), 1);

    assert!(orch.run(&Task::Test, temp.path(), &policy(2)).expect("second").is_success());
    assert_eq!(suggester.calls(), 1);
    assert_eq!(store.writes(), 1);
    assert_eq!(executor.calls(), vec!["make", "make"]);
}

#[test]
fn generation_budget_bounds_suggester_calls() {
    let temp = project(&[]);
    let suggester = ScriptedSuggester::replies(["", "```\n```", " "]);
    let executor = ScriptedExecutor::succeed_on(&[]);
    let store = MemoryStore::default();
    let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

    let outcome = orch.run(&Task::Lint, temp.path(), &policy(3)).expect("run");

    match outcome {
        RunOutcome::GenerationFailed {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("blank"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(suggester.calls(), 3);
    assert!(executor.calls().is_empty());
    assert_eq!(store.writes(), 0);
}

#[test]
fn stored_command_with_blank_repairs_ends_as_execution_failure() {
    let temp = project(&[]);
    let store = MemoryStore::default().with(temp.path(), Task::Build, "make");
    let suggester = ScriptedSuggester::replies(["", "```\n```"]);
    let executor = ScriptedExecutor::succeed_on(&[]);
    let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

    let outcome = orch.run(&Task::Build, temp.path(), &policy(2)).expect("run");

    match outcome {
        RunOutcome::ExecutionFailed {
            command,
            attempts,
            last_error,
        } => {
            assert_eq!(command, "make");
            assert_eq!(attempts, 2);
            assert!(last_error.contains("received empty dependency command"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(executor.calls(), vec!["make", "make"]);
    assert_eq!(store.get_raw(temp.path(), &Task::Build).as_deref(), Some("make"));
}

#[test]
fn execution_budget_is_separate_from_generation_budget() {
    let temp = project(&[]);
    // Two generations; each command gets two executions (+ repair + rerun).
    let suggester = ScriptedSuggester::replies([
        "make", "   ", "   ", "ninja", "   ", "   ",
    ]);
    let executor = ScriptedExecutor::succeed_on(&[]);
    let store = MemoryStore::default();
    let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

    let outcome = orch
        .run(&Task::Build, temp.path(), &policy(2).with_execute_attempts(2))
        .expect("run");

    assert!(matches!(
        outcome,
        RunOutcome::DependencyRepairFailed { ref command, attempts: 2, .. } if command == "ninja"
    ));
    assert_eq!(executor.calls(), vec!["make", "make", "ninja", "ninja"]);
    assert_eq!(suggester.calls(), 6);
}

#[test]
fn setting_one_task_preserves_the_others() {
    let temp = project(&[]);
    let store = FileCommandStore;
    let cargo_test = taskforge::core::command::CommandText::new("cargo test\n").expect("command");
    store.set(temp.path(), &Task::Test, &cargo_test).expect("seed");

    let suggester = ScriptedSuggester::replies(["cargo build"]);
    let executor = ScriptedExecutor::succeed_on(&["cargo build"]);
    let mut orch = Orchestrator::new(&suggester, &executor, store).expect("orchestrator");
    assert!(orch.run(&Task::Build, temp.path(), &policy(1)).expect("run").is_success());

    let stored = load_store_file(&store_path(temp.path())).expect("load");
    assert_eq!(stored.build_command, "cargo build\n");
    assert_eq!(stored.test_command, "cargo test\n");
    assert_eq!(stored.lint_command, "");
}

#[test]
fn repair_shares_the_generation_conversation() {
    let temp = project(&[]);
    let suggester = ScriptedSuggester::replies(["pytest", "pip install -y pytest"]);
    let executor = ScriptedExecutor::new(|command, seen| match command {
        "pytest" if seen == 0 => Err(ScriptedExecutor::failure("pytest: command not found")),
        _ => Ok(()),
    });
    let store = MemoryStore::default();
    let mut orch = Orchestrator::new(&suggester, &executor, &store).expect("orchestrator");

    assert!(orch.run(&Task::Test, temp.path(), &policy(1)).expect("run").is_success());

    let history = orch.conversation().messages();
    assert_eq!(history.len(), 4);
    assert!(history[2].content.contains("pytest: command not found"));
}
