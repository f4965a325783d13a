//! Generate a new source file and optionally prove it builds.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::command::strip_code_fences;
use crate::core::policy::RetryPolicy;
use crate::core::task::Task;
use crate::io::executor::Executor;
use crate::io::store::{CommandStore, find_project_root};
use crate::io::suggester::Suggester;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub file: PathBuf,
    /// Blank means the default "meaningful content" prompt.
    pub prompt: String,
    /// Tasks that must succeed in the file's project root after writing.
    pub checks: Vec<Task>,
    /// Content tries (`retry + 1` from the CLI).
    pub tries: u32,
    /// Budget and delay for each check run; `delay` also separates tries.
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created { path: PathBuf, tries: u32 },
    Failed { tries: u32, last_error: String },
}

/// Previous state of the target file, restored when a try is rejected.
enum Previous {
    Absent,
    Content(Vec<u8>),
}

impl Previous {
    fn capture(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(Previous::Content(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Previous::Absent),
            Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
        }
    }

    fn restore(&self, path: &Path) -> Result<()> {
        match self {
            Previous::Content(bytes) => {
                fs::write(path, bytes).with_context(|| format!("restore {}", path.display()))
            }
            Previous::Absent => match fs::remove_file(path) {
                Err(err) if err.kind() != ErrorKind::NotFound => {
                    Err(err).with_context(|| format!("remove {}", path.display()))
                }
                _ => Ok(()),
            },
        }
    }
}

/// Write suggester-generated content to `request.file`, then run the checks.
///
/// A try that fails a check is rolled back before the next one starts.
#[instrument(skip_all, fields(file = %request.file.display()))]
pub fn create<S, E, C>(
    orchestrator: &mut Orchestrator<'_, S, E, C>,
    request: &CreateRequest,
) -> Result<CreateOutcome>
where
    S: Suggester,
    E: Executor,
    C: CommandStore,
{
    let previous = Previous::capture(&request.file)?;
    let root = check_root(&request.file);
    let file_name = request
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let prompt = orchestrator
        .prompts()
        .render_create(&request.prompt, &file_name)?;

    let mut last_error = "no attempts allowed".to_string();
    for attempt in 1..=request.tries {
        if attempt > 1 {
            request.policy.pause();
        }

        let content = match orchestrator.suggest(&prompt) {
            Ok(raw) => strip_code_fences(&raw),
            Err(err) => {
                warn!(attempt, err = %err, "content suggestion failed");
                last_error = err.to_string();
                continue;
            }
        };
        if content.is_empty() {
            last_error = "suggester returned blank content".to_string();
            continue;
        }

        if let Some(parent) = request.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&request.file, content)
            .with_context(|| format!("write {}", request.file.display()))?;
        info!(attempt, "wrote generated file");

        match run_checks(orchestrator, &request.checks, &root, &request.policy)? {
            None => {
                return Ok(CreateOutcome::Created {
                    path: request.file.clone(),
                    tries: attempt,
                });
            }
            Some(failure) => {
                warn!(attempt, failure = %failure, "check failed, rolling back");
                previous.restore(&request.file)?;
                last_error = failure;
            }
        }
    }

    Ok(CreateOutcome::Failed {
        tries: request.tries,
        last_error,
    })
}

/// Directory the checks run in: the nearest project root, else the file's parent.
fn check_root(file: &Path) -> PathBuf {
    find_project_root(file).unwrap_or_else(|| match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    })
}

/// Run every check; `Some(message)` describes the first failing one.
fn run_checks<S, E, C>(
    orchestrator: &mut Orchestrator<'_, S, E, C>,
    checks: &[Task],
    root: &Path,
    policy: &RetryPolicy,
) -> Result<Option<String>>
where
    S: Suggester,
    E: Executor,
    C: CommandStore,
{
    for task in checks {
        let outcome = orchestrator.run(task, root, policy)?;
        if let Some(error) = outcome.last_error() {
            return Ok(Some(format!("{task} check failed: {error}")));
        }
    }
    Ok(None)
}
