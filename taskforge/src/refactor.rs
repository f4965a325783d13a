//! Rewrite source files through the suggester.
//!
//! A single file or every file under a directory is sent to the suggester with
//! an instruction; the fence-stripped reply replaces the file (or lands under
//! an output path, keeping relative paths). Files are processed sequentially.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::core::command::strip_code_fences;
use crate::core::policy::RetryPolicy;
use crate::io::files::list_files;
use crate::io::prompt::PromptEngine;
use crate::io::store::STORE_FILE_NAME;
use crate::io::suggester::{Conversation, Suggester};

/// What to refactor and where to put the result.
#[derive(Debug, Clone)]
pub struct RefactorRequest {
    /// File or directory to rewrite.
    pub path: PathBuf,
    /// Free-form instruction; blank means the default optimization prompt.
    pub instruction: String,
    /// Destination file or directory; `None` rewrites in place.
    pub output: Option<PathBuf>,
    /// `generate_attempts` bounds tries per file; `delay` separates them.
    pub policy: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Rewritten { source: PathBuf, target: PathBuf },
    Skipped { path: PathBuf, reason: String },
    Failed { path: PathBuf, error: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefactorReport {
    pub files: Vec<FileOutcome>,
}

impl RefactorReport {
    pub fn rewritten(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Rewritten { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f, FileOutcome::Failed { .. }))
            .count()
    }
}

/// One source file and where its rewrite goes.
struct Job {
    source: PathBuf,
    rel: String,
    target: PathBuf,
}

#[instrument(skip_all, fields(path = %request.path.display()))]
pub fn refactor<S: Suggester>(
    suggester: &S,
    prompts: &PromptEngine,
    request: &RefactorRequest,
) -> Result<RefactorReport> {
    let jobs = plan_jobs(&request.path, request.output.as_deref())?;
    let mut report = RefactorReport::default();

    for job in jobs {
        // One unreadable or unwritable file must not abort the rest of the run.
        let outcome = refactor_file(suggester, prompts, request, &job).unwrap_or_else(|err| {
            FileOutcome::Failed {
                path: job.source.clone(),
                error: format!("{err:#}"),
            }
        });
        match &outcome {
            FileOutcome::Rewritten { target, .. } => {
                info!(source = %job.rel, target = %target.display(), "rewrote file");
            }
            FileOutcome::Skipped { reason, .. } => {
                info!(source = %job.rel, reason = %reason, "skipped file");
            }
            FileOutcome::Failed { error, .. } => {
                warn!(source = %job.rel, error = %error, "refactor failed");
            }
        }
        report.files.push(outcome);
    }
    Ok(report)
}

fn plan_jobs(path: &Path, output: Option<&Path>) -> Result<Vec<Job>> {
    if path.is_file() {
        let rel = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .with_context(|| format!("no file name in {}", path.display()))?;
        let target = match output {
            None => path.to_path_buf(),
            Some(out) if out.is_dir() => out.join(&rel),
            Some(out) => out.to_path_buf(),
        };
        return Ok(vec![Job {
            source: path.to_path_buf(),
            rel,
            target,
        }]);
    }

    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }
    if let Some(out) = output {
        if out.is_file() {
            bail!(
                "output {} must be a directory when refactoring a directory",
                out.display()
            );
        }
    }

    let (files, _) = list_files(path, usize::MAX)?;
    Ok(files
        .into_iter()
        .filter(|rel| Path::new(rel).file_name() != Some(OsStr::new(STORE_FILE_NAME)))
        .map(|rel| {
            let source = path.join(&rel);
            let target = match output {
                None => source.clone(),
                Some(out) => out.join(&rel),
            };
            Job {
                source,
                rel,
                target,
            }
        })
        .collect())
}

fn refactor_file<S: Suggester>(
    suggester: &S,
    prompts: &PromptEngine,
    request: &RefactorRequest,
    job: &Job,
) -> Result<FileOutcome> {
    let bytes =
        fs::read(&job.source).with_context(|| format!("read {}", job.source.display()))?;
    let Ok(code) = String::from_utf8(bytes) else {
        return Ok(FileOutcome::Skipped {
            path: job.source.clone(),
            reason: "not UTF-8 text".to_string(),
        });
    };
    if code.trim().is_empty() {
        return Ok(FileOutcome::Skipped {
            path: job.source.clone(),
            reason: "empty file".to_string(),
        });
    }

    let prompt = prompts.render_refactor(&request.instruction, &job.rel, &code)?;
    let mut conversation = Conversation::new();
    let mut last_error = "no attempts allowed".to_string();

    for attempt in 1..=request.policy.generate_attempts {
        if attempt > 1 {
            request.policy.pause();
        }
        let rewritten = match suggester.suggest(&prompt, &mut conversation) {
            Ok(raw) => strip_code_fences(&raw),
            Err(err) => {
                warn!(attempt, err = %err, "refactor suggestion failed");
                last_error = err.to_string();
                continue;
            }
        };
        if rewritten.is_empty() {
            last_error = "suggester returned blank content".to_string();
            continue;
        }

        if let Some(parent) = job.target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&job.target, rewritten)
            .with_context(|| format!("write {}", job.target.display()))?;
        return Ok(FileOutcome::Rewritten {
            source: job.source.clone(),
            target: job.target.clone(),
        });
    }

    Ok(FileOutcome::Failed {
        path: job.source.clone(),
        error: last_error,
    })
}
