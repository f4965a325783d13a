//! Lifecycle command orchestration backed by an LLM suggestion service.
//!
//! `taskforge` turns an intent such as "build this directory" into a shell
//! command: it reuses the command stored for the directory, or asks a
//! suggester for one, runs it, repairs missing dependencies once per failed
//! attempt, and persists the command that worked.
//!
//! - **[`core`]**: Pure types (tasks, command text, retry policy, outcomes).
//! - **[`io`]**: Side-effecting collaborators behind traits (suggester,
//!   executor, command store) so the engine can be tested without a network
//!   or a shell.
//!
//! [`orchestrator`] holds the state machine; [`repair`], [`refactor`] and
//! [`create`] build on it for the CLI commands.

pub mod core;
pub mod create;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod refactor;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
