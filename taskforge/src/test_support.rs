//! Test-only collaborators with scripted behavior and call recording.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::core::command::CommandText;
use crate::core::task::Task;
use crate::error::{ExecutionError, PersistenceError, SuggestError};
use crate::io::executor::Executor;
use crate::io::store::CommandStore;
use crate::io::suggester::{Conversation, Suggester};
use crate::orchestrator::RunEvent;

/// Suggester that replays queued replies and records every prompt.
///
/// Once the queue is empty every call fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedSuggester {
    replies: RefCell<VecDeque<Result<String, SuggestError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedSuggester {
    pub fn new(replies: impl IntoIterator<Item = Result<String, SuggestError>>) -> Self {
        Self {
            replies: RefCell::new(replies.into_iter().collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// Only successful replies, in order.
    pub fn replies<'s>(replies: impl IntoIterator<Item = &'s str>) -> Self {
        Self::new(replies.into_iter().map(|reply| Ok(reply.to_string())))
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Suggester for ScriptedSuggester {
    fn suggest(
        &self,
        prompt: &str,
        conversation: &mut Conversation,
    ) -> Result<String, SuggestError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(SuggestError::Transport("script exhausted".to_string())));
        if let Ok(text) = &reply {
            conversation.record(prompt, text);
        }
        reply
    }
}

type ExecScript = Box<dyn FnMut(&str, usize) -> Result<(), ExecutionError>>;

/// Executor driven by a closure `(command, times_seen_before) -> result`.
///
/// Commands are recorded with trailing whitespace trimmed.
pub struct ScriptedExecutor {
    script: RefCell<ExecScript>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl FnMut(&str, usize) -> Result<(), ExecutionError> + 'static) -> Self {
        Self {
            script: RefCell::new(Box::new(script)),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Succeeds for the listed commands, fails with exit 127 for anything else.
    pub fn succeed_on(commands: &[&str]) -> Self {
        let allowed: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
        Self::new(move |command, _| {
            if allowed.iter().any(|ok| ok == command) {
                Ok(())
            } else {
                Err(ExecutionError::Failed {
                    code: Some(127),
                    output: format!("sh: {command}: command not found\n"),
                })
            }
        })
    }

    /// A non-zero exit carrying `output`.
    pub fn failure(output: &str) -> ExecutionError {
        ExecutionError::Failed {
            code: Some(1),
            output: output.to_string(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Executor for ScriptedExecutor {
    fn run(&self, _directory: &Path, command: &str) -> Result<(), ExecutionError> {
        let command = command.trim_end();
        let seen = self
            .calls
            .borrow()
            .iter()
            .filter(|previous| previous.as_str() == command)
            .count();
        self.calls.borrow_mut().push(command.to_string());
        let mut script = self.script.borrow_mut();
        (*script)(command, seen)
    }
}

/// In-memory [`CommandStore`] keyed by `(directory, task)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<(PathBuf, Task), String>>,
    writes: RefCell<usize>,
    fail_writes: bool,
}

impl MemoryStore {
    /// Seed a raw stored value.
    pub fn with(self, directory: &Path, task: Task, command: &str) -> Self {
        self.entries
            .borrow_mut()
            .insert((directory.to_path_buf(), task), command.to_string());
        self
    }

    /// Make every `set` fail with a write error.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn get_raw(&self, directory: &Path, task: &Task) -> Option<String> {
        self.entries
            .borrow()
            .get(&(directory.to_path_buf(), task.clone()))
            .cloned()
    }

    pub fn writes(&self) -> usize {
        *self.writes.borrow()
    }
}

impl CommandStore for MemoryStore {
    fn get(&self, directory: &Path, task: &Task) -> Result<Option<CommandText>, PersistenceError> {
        Ok(self.get_raw(directory, task).and_then(CommandText::new))
    }

    fn set(
        &self,
        directory: &Path,
        task: &Task,
        command: &CommandText,
    ) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::Write {
                path: directory.to_path_buf(),
                source: std::io::Error::other("read-only store"),
            });
        }
        *self.writes.borrow_mut() += 1;
        self.entries.borrow_mut().insert(
            (directory.to_path_buf(), task.clone()),
            command.as_str().to_string(),
        );
        Ok(())
    }
}

/// Shared log of [`RunEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Rc<RefCell<Vec<RunEvent>>>);

impl EventLog {
    /// Callback for `Orchestrator::on_event` that appends to this log.
    pub fn recorder(&self) -> impl FnMut(&RunEvent) + 'static {
        let log = Rc::clone(&self.0);
        move |event| log.borrow_mut().push(event.clone())
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.0.borrow().clone()
    }
}

/// Temporary project directory populated with `(relative path, contents)` files.
pub fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    for (rel, contents) in files {
        let path = temp.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write project file");
    }
    temp
}
