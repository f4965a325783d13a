//! Pure types shared by the orchestration engine.
//!
//! Core modules are free of I/O side effects: task kinds, validated command
//! text, retry budgets and run outcomes.

pub mod command;
pub mod outcome;
pub mod policy;
pub mod task;
