//! Per-directory command store (`<dir>/.taskforge.toml`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::core::command::CommandText;
use crate::core::task::Task;
use crate::error::PersistenceError;

/// File name of the store inside a project directory.
pub const STORE_FILE_NAME: &str = ".taskforge.toml";

/// Durable `(directory, task) -> command` persistence.
pub trait CommandStore {
    /// Stored command for `task`, or `None` when absent or blank.
    fn get(&self, directory: &Path, task: &Task) -> Result<Option<CommandText>, PersistenceError>;

    /// Store `command` for `task`, preserving every other slot.
    fn set(
        &self,
        directory: &Path,
        task: &Task,
        command: &CommandText,
    ) -> Result<(), PersistenceError>;
}

impl<T: CommandStore + ?Sized> CommandStore for &T {
    fn get(&self, directory: &Path, task: &Task) -> Result<Option<CommandText>, PersistenceError> {
        (**self).get(directory, task)
    }

    fn set(
        &self,
        directory: &Path,
        task: &Task,
        command: &CommandText,
    ) -> Result<(), PersistenceError> {
        (**self).set(directory, task, command)
    }
}

/// On-disk layout of the store file.
///
/// Blank values are valid and mean "no stored command".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoreFile {
    pub build_command: String,
    pub test_command: String,
    pub lint_command: String,
    pub docs_command: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom: BTreeMap<String, String>,
}

impl StoreFile {
    pub fn command(&self, task: &Task) -> Option<&str> {
        let value = match task {
            Task::Build => &self.build_command,
            Task::Test => &self.test_command,
            Task::Lint => &self.lint_command,
            Task::Docs => &self.docs_command,
            Task::Custom(custom) => self.custom.get(&custom.name)?,
        };
        (!value.trim().is_empty()).then_some(value.as_str())
    }

    pub fn set_command(&mut self, task: &Task, command: &str) {
        let command = command.to_string();
        match task {
            Task::Build => self.build_command = command,
            Task::Test => self.test_command = command,
            Task::Lint => self.lint_command = command,
            Task::Docs => self.docs_command = command,
            Task::Custom(custom) => {
                self.custom.insert(custom.name.clone(), command);
            }
        }
    }

    /// All non-blank slots as `(name, command)` in a stable order.
    pub fn entries(&self) -> Vec<(String, String)> {
        let builtin = Task::builtin();
        let mut out: Vec<(String, String)> = builtin
            .iter()
            .filter_map(|task| {
                self.command(task)
                    .map(|cmd| (task.name().to_string(), cmd.trim_end().to_string()))
            })
            .collect();
        out.extend(
            self.custom
                .iter()
                .filter(|(_, cmd)| !cmd.trim().is_empty())
                .map(|(name, cmd)| (name.clone(), cmd.trim_end().to_string())),
        );
        out
    }
}

/// Path of the store file for `directory`.
pub fn store_path(directory: &Path) -> PathBuf {
    directory.join(STORE_FILE_NAME)
}

/// Load the store file. A missing file is an empty store, not an error.
pub fn load_store_file(path: &Path) -> Result<StoreFile, PersistenceError> {
    if !path.exists() {
        debug!(path = %path.display(), "store file missing");
        return Ok(StoreFile::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| PersistenceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Atomically write the store file (temp file + rename).
pub fn write_store_file(path: &Path, file: &StoreFile) -> Result<(), PersistenceError> {
    let mut buf = toml::to_string_pretty(file).map_err(|source| PersistenceError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    if !buf.ends_with('\n') {
        buf.push('\n');
    }
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    let write_err = |source: std::io::Error| PersistenceError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents).map_err(write_err)?;
    fs::rename(&tmp_path, path).map_err(write_err)?;
    Ok(())
}

/// Create an empty store file in `directory`.
///
/// Refuses to replace an existing file unless `force` is set.
pub fn init_store(directory: &Path, force: bool) -> Result<PathBuf, PersistenceError> {
    let path = store_path(directory);
    if path.exists() && !force {
        return Err(PersistenceError::AlreadyExists { path });
    }
    write_store_file(&path, &StoreFile::default())?;
    Ok(path)
}

/// Walk up from `path` to the nearest directory holding a store file.
pub fn find_project_root(path: &Path) -> Option<PathBuf> {
    let start = if path.is_dir() { path } else { path.parent()? };
    start
        .ancestors()
        .find(|dir| store_path(dir).is_file())
        .map(Path::to_path_buf)
}

/// [`CommandStore`] backed by one TOML file per project directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileCommandStore;

impl CommandStore for FileCommandStore {
    #[instrument(skip_all, fields(directory = %directory.display(), task = %task))]
    fn get(&self, directory: &Path, task: &Task) -> Result<Option<CommandText>, PersistenceError> {
        let file = load_store_file(&store_path(directory))?;
        let Some(raw) = file.command(task) else {
            return Ok(None);
        };
        match CommandText::new(raw) {
            Some(cmd) => Ok(Some(cmd)),
            None => {
                warn!(command = raw, "ignoring stored command containing a code fence");
                Ok(None)
            }
        }
    }

    #[instrument(skip_all, fields(directory = %directory.display(), task = %task))]
    fn set(
        &self,
        directory: &Path,
        task: &Task,
        command: &CommandText,
    ) -> Result<(), PersistenceError> {
        let path = store_path(directory);
        let mut file = load_store_file(&path)?;
        file.set_command(task, command.as_str());
        write_store_file(&path, &file)?;
        debug!(path = %path.display(), "stored command");
        Ok(())
    }
}
