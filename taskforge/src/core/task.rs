//! Task kinds and the store slot / prompt instruction each one maps to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user-named task with a free-form goal (e.g. `bench` -> "run the benchmarks").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomTask {
    pub name: String,
    pub goal: String,
}

impl CustomTask {
    /// Build a custom task, validating that `name` is usable as a store key.
    pub fn new(name: impl Into<String>, goal: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        validate_task_name(&name)?;
        Ok(Self {
            name,
            goal: goal.into(),
        })
    }
}

/// Lifecycle task selected for one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    Build,
    Test,
    Lint,
    Docs,
    Custom(CustomTask),
}

impl Task {
    /// Short lowercase name used in progress output (`build`, `bench`, ...).
    pub fn name(&self) -> &str {
        match self {
            Task::Build => "build",
            Task::Test => "test",
            Task::Lint => "lint",
            Task::Docs => "docs",
            Task::Custom(custom) => &custom.name,
        }
    }

    /// Key of the built-in slot in the store file, `None` for custom tasks.
    pub fn store_key(&self) -> Option<&'static str> {
        match self {
            Task::Build => Some("build-command"),
            Task::Test => Some("test-command"),
            Task::Lint => Some("lint-command"),
            Task::Docs => Some("docs-command"),
            Task::Custom(_) => None,
        }
    }

    /// Verb phrase completing "Provide the simplest command line required to ...".
    pub fn instruction(&self) -> String {
        match self {
            Task::Build => "build the listed files".to_string(),
            Task::Test => "test the listed files".to_string(),
            Task::Lint => "lint the listed files".to_string(),
            Task::Docs => "generate documentation for the listed files".to_string(),
            Task::Custom(custom) => {
                format!("{} for the listed files", custom.goal.trim())
            }
        }
    }

    /// The four built-in tasks in a stable order.
    pub fn builtin() -> [Task; 4] {
        [Task::Build, Task::Test, Task::Lint, Task::Docs]
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Validate that a custom task name is a safe, stable store key.
pub fn validate_task_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("task name must not be empty".to_string());
    }
    if name
        .chars()
        .any(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-'))
    {
        return Err(format!("task name must be [a-z0-9_-] only (got '{name}')"));
    }
    if matches!(name, "build" | "test" | "lint" | "docs") {
        return Err(format!("'{name}' is a built-in task, use its subcommand"));
    }
    Ok(())
}
