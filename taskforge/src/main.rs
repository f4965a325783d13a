//! taskforge CLI.
//!
//! Generates, runs and remembers lifecycle commands (build, test, lint, docs
//! and named custom tasks) per project directory. Commands come from
//! `.taskforge.toml` when stored, otherwise from the configured suggester.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use taskforge::core::outcome::RunOutcome;
use taskforge::core::policy::RetryPolicy;
use taskforge::core::task::{CustomTask, Task};
use taskforge::create::{CreateOutcome, CreateRequest, create};
use taskforge::exit_codes;
use taskforge::io::config::{ForgeConfig, resolve_config};
use taskforge::io::executor::ShellExecutor;
use taskforge::io::prompt::PromptEngine;
use taskforge::io::store::{
    FileCommandStore, STORE_FILE_NAME, find_project_root, init_store, load_store_file, store_path,
};
use taskforge::io::suggester::OpenAiSuggester;
use taskforge::logging;
use taskforge::orchestrator::{Orchestrator, RunEvent};
use taskforge::refactor::{FileOutcome, RefactorRequest, refactor};

#[derive(Parser)]
#[command(
    name = "taskforge",
    version,
    about = "Generate, run and remember project lifecycle commands"
)]
struct Cli {
    /// Config file (default: ~/.config/taskforge/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Default)]
struct RetryArgs {
    /// Generation attempts; also the execution budget unless --exec-retry is set.
    #[arg(long, value_name = "N")]
    retry: Option<u32>,

    /// Execution attempts per generated or stored command.
    #[arg(long, value_name = "N")]
    exec_retry: Option<u32>,

    /// Pause between attempts in milliseconds.
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the files in a directory.
    Build {
        directory: PathBuf,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Run the tests of a directory.
    Test {
        directory: PathBuf,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Lint the files in a directory.
    Lint {
        directory: PathBuf,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Generate documentation for a directory.
    Docs {
        directory: PathBuf,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Run a named custom task (stored under `[custom]`).
    Run {
        name: String,
        directory: PathBuf,
        /// What the command should do, e.g. "run the benchmarks".
        #[arg(long)]
        goal: String,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Create an empty `.taskforge.toml`.
    Init {
        directory: Option<PathBuf>,
        /// Overwrite an existing store file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the stored commands of a project.
    Show { directory: Option<PathBuf> },
    /// Rewrite a file, or every file under a directory, per an instruction.
    Refactor {
        path: PathBuf,
        instruction: Option<String>,
        /// Output file or directory (default: rewrite in place).
        output: Option<PathBuf>,
        /// Extra tries per file.
        #[arg(long, value_name = "N")]
        retry: Option<u32>,
        #[arg(long, value_name = "MS")]
        delay_ms: Option<u64>,
    },
    /// Generate a new file from a prompt, optionally checking the project still works.
    Create {
        file: PathBuf,
        prompt: Option<String>,
        /// Extra tries when generation or a check fails.
        #[arg(long, value_name = "N")]
        retry: Option<u32>,
        #[arg(long, value_name = "MS")]
        delay_ms: Option<u64>,
        #[arg(long)]
        build: bool,
        #[arg(long)]
        lint: bool,
        #[arg(long)]
        test: bool,
        #[arg(long)]
        docs: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config = resolve_config(cli.config.as_deref())?;
    match cli.command {
        Command::Build { directory, retry } => cmd_task(&config, Task::Build, &directory, &retry),
        Command::Test { directory, retry } => cmd_task(&config, Task::Test, &directory, &retry),
        Command::Lint { directory, retry } => cmd_task(&config, Task::Lint, &directory, &retry),
        Command::Docs { directory, retry } => cmd_task(&config, Task::Docs, &directory, &retry),
        Command::Run {
            name,
            directory,
            goal,
            retry,
        } => {
            let custom = CustomTask::new(name, goal).map_err(anyhow::Error::msg)?;
            cmd_task(&config, Task::Custom(custom), &directory, &retry)
        }
        Command::Init { directory, force } => cmd_init(directory, force),
        Command::Show { directory } => cmd_show(directory),
        Command::Refactor {
            path,
            instruction,
            output,
            retry,
            delay_ms,
        } => cmd_refactor(&config, path, instruction, output, retry, delay_ms),
        Command::Create {
            file,
            prompt,
            retry,
            delay_ms,
            build,
            lint,
            test,
            docs,
        } => {
            let checks = [(build, Task::Build), (lint, Task::Lint), (test, Task::Test), (docs, Task::Docs)]
                .into_iter()
                .filter_map(|(enabled, task)| enabled.then_some(task))
                .collect();
            cmd_create(&config, file, prompt, checks, retry, delay_ms)
        }
    }
}

fn orchestrator(
    config: &ForgeConfig,
) -> Result<Orchestrator<'static, OpenAiSuggester, ShellExecutor, FileCommandStore>> {
    let suggester = OpenAiSuggester::new(config.suggester.clone())?;
    let executor = ShellExecutor::new(&config.shell, config.output_limit_bytes);
    Ok(Orchestrator::new(suggester, executor, FileCommandStore)?
        .with_max_listed_files(config.max_listed_files)
        .on_event(print_event))
}

fn cmd_task(config: &ForgeConfig, task: Task, directory: &Path, retry: &RetryArgs) -> Result<i32> {
    if !directory.is_dir() {
        bail!("{} is not a directory", directory.display());
    }
    let policy = config.retry_policy(retry.retry, retry.exec_retry, retry.delay_ms);
    let mut orchestrator = orchestrator(config)?;
    let outcome = orchestrator
        .run(&task, directory, &policy)
        .with_context(|| format!("{task} in {}", directory.display()))?;
    Ok(report_outcome(&task, &outcome))
}

fn cmd_init(directory: Option<PathBuf>, force: bool) -> Result<i32> {
    let directory = directory.unwrap_or_else(|| PathBuf::from("."));
    if !directory.is_dir() {
        bail!("{} is not a directory", directory.display());
    }
    let path = init_store(&directory, force)?;
    println!("Created {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_show(directory: Option<PathBuf>) -> Result<i32> {
    let directory = match directory {
        Some(dir) => dir,
        None => {
            let cwd = std::env::current_dir().context("resolve current directory")?;
            find_project_root(&cwd).unwrap_or(cwd)
        }
    };
    let path = store_path(&directory);
    if !path.exists() {
        println!("No {STORE_FILE_NAME} in {}", directory.display());
        return Ok(exit_codes::OK);
    }
    let entries = load_store_file(&path)?.entries();
    if entries.is_empty() {
        println!("No stored commands in {}", path.display());
    }
    for (name, command) in entries {
        println!("{name}: {command}");
    }
    Ok(exit_codes::OK)
}

fn cmd_refactor(
    config: &ForgeConfig,
    path: PathBuf,
    instruction: Option<String>,
    output: Option<PathBuf>,
    retry: Option<u32>,
    delay_ms: Option<u64>,
) -> Result<i32> {
    let request = RefactorRequest {
        path,
        instruction: instruction.unwrap_or_default(),
        output,
        policy: RetryPolicy::uniform(
            retry.unwrap_or(config.retry_attempts).saturating_add(1),
            Duration::from_millis(delay_ms.unwrap_or(config.retry_delay_ms)),
        ),
    };
    let suggester = OpenAiSuggester::new(config.suggester.clone())?;
    let prompts = PromptEngine::new()?;
    let report = refactor(&suggester, &prompts, &request)?;

    for file in &report.files {
        match file {
            FileOutcome::Rewritten { source, target } if source == target => {
                println!("Refactored {}", source.display());
            }
            FileOutcome::Rewritten { source, target } => {
                println!("Refactored {} -> {}", source.display(), target.display());
            }
            FileOutcome::Skipped { path, reason } => {
                println!("Skipped {} ({reason})", path.display());
            }
            FileOutcome::Failed { path, error } => {
                eprintln!("Failed to refactor {}: {error}", path.display());
            }
        }
    }
    if report.failed() > 0 {
        return Ok(exit_codes::GENERATION_FAILED);
    }
    Ok(exit_codes::OK)
}

fn cmd_create(
    config: &ForgeConfig,
    file: PathBuf,
    prompt: Option<String>,
    checks: Vec<Task>,
    retry: Option<u32>,
    delay_ms: Option<u64>,
) -> Result<i32> {
    let has_checks = !checks.is_empty();
    let request = CreateRequest {
        file,
        prompt: prompt.unwrap_or_default(),
        checks,
        tries: retry.unwrap_or(config.retry_attempts).saturating_add(1),
        policy: config.retry_policy(None, None, delay_ms),
    };
    let mut orchestrator = orchestrator(config)?;
    match create(&mut orchestrator, &request)? {
        CreateOutcome::Created { path, tries } => {
            println!("Created {} (try {tries})", path.display());
            Ok(exit_codes::OK)
        }
        CreateOutcome::Failed { tries, last_error } => {
            eprintln!("Could not create {} after {tries} tries: {last_error}", request.file.display());
            if has_checks {
                Ok(exit_codes::EXECUTION_FAILED)
            } else {
                Ok(exit_codes::GENERATION_FAILED)
            }
        }
    }
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::UsingStored { command } => println!("Using stored command: {command}"),
        RunEvent::GenerationAttempt { attempt, max } => {
            println!("Generating command (attempt {attempt}/{max})");
        }
        RunEvent::GenerationFailed { attempt, error } => {
            println!("Generation attempt {attempt} failed: {error}");
        }
        RunEvent::CommandGenerated { command } => println!("Suggested command: {command}"),
        RunEvent::ExecutionAttempt {
            attempt,
            max,
            command,
        } => println!("Running (attempt {attempt}/{max}): {command}"),
        RunEvent::ExecutionFailed { attempt, error } => {
            println!("Attempt {attempt} failed: {error}");
        }
        RunEvent::RepairCommand { command } => println!("Installing dependencies: {command}"),
        RunEvent::RepairFailed { error } => println!("Dependency repair failed: {error}"),
        RunEvent::InstallFailed { error } => println!("Dependency install failed: {error}"),
        RunEvent::Rerun { command, .. } => println!("Retrying original command: {command}"),
        RunEvent::Persisted { task } => println!("Saved {task} command to {STORE_FILE_NAME}"),
        RunEvent::Succeeded { .. } => {}
    }
}

fn report_outcome(task: &Task, outcome: &RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Success { command } => {
            println!("{task} succeeded: {command}");
            exit_codes::OK
        }
        RunOutcome::GenerationFailed {
            attempts,
            last_error,
        } => {
            eprintln!("{task}: no usable command after {attempts} attempts: {last_error}");
            exit_codes::GENERATION_FAILED
        }
        RunOutcome::ExecutionFailed {
            command,
            attempts,
            last_error,
        } => {
            eprintln!("{task}: `{command}` failed after {attempts} attempts: {last_error}");
            exit_codes::EXECUTION_FAILED
        }
        RunOutcome::DependencyRepairFailed {
            command,
            attempts,
            last_error,
        } => {
            eprintln!(
                "{task}: `{command}` failed after {attempts} attempts, dependency repair failed: {last_error}"
            );
            exit_codes::REPAIR_FAILED
        }
    }
}
