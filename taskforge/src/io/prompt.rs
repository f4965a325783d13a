//! Prompt rendering for generation, repair, refactor and create requests.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::task::Task;

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");
const REFACTOR_TEMPLATE: &str = include_str!("prompts/refactor.md");
const CREATE_TEMPLATE: &str = include_str!("prompts/create.md");

/// Instruction used by `refactor` when none is given.
pub const DEFAULT_REFACTOR_INSTRUCTION: &str =
    "Optimize the code for better performance and readability.";

/// Prompt used by `create` when none is given.
pub const DEFAULT_CREATE_PROMPT: &str = "Create a new code file with meaningful content.";

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("generate", GENERATE_TEMPLATE)?;
        env.add_template("repair", REPAIR_TEMPLATE)?;
        env.add_template("refactor", REFACTOR_TEMPLATE)?;
        env.add_template("create", CREATE_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Ask for the simplest single-line command performing `task` over `files`.
    pub fn render_generation(&self, task: &Task, files: &[String], omitted: usize) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template.render(context! {
            instruction => task.instruction(),
            files => files,
            omitted => omitted,
        })?;
        Ok(rendered)
    }

    /// Ask for one `&&`-chained, non-interactive install command.
    pub fn render_repair(&self, command: &str, error: &str, platform: &str) -> Result<String> {
        let template = self.env.get_template("repair")?;
        let rendered = template.render(context! {
            command => command.trim(),
            error => error.trim(),
            platform => platform,
        })?;
        Ok(rendered)
    }

    pub fn render_refactor(&self, instruction: &str, file_name: &str, code: &str) -> Result<String> {
        let instruction = match instruction.trim() {
            "" => DEFAULT_REFACTOR_INSTRUCTION,
            text => text,
        };
        let template = self.env.get_template("refactor")?;
        let rendered = template.render(context! {
            instruction => instruction,
            file_name => (!file_name.is_empty()).then_some(file_name),
            code => code.trim_end(),
        })?;
        Ok(rendered)
    }

    pub fn render_create(&self, prompt: &str, file_name: &str) -> Result<String> {
        let prompt = match prompt.trim() {
            "" => DEFAULT_CREATE_PROMPT,
            text => text,
        }
        .trim_end_matches('.');
        let template = self.env.get_template("create")?;
        let rendered = template.render(context! {
            prompt => prompt,
            file_name => (!file_name.is_empty()).then_some(file_name),
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::CustomTask;

    fn engine() -> PromptEngine {
        PromptEngine::new().expect("templates")
    }

    #[test]
    fn generation_prompt_lists_files() {
        let files = vec!["Makefile".to_string(), "src/main.c".to_string()];
        let prompt = engine()
            .render_generation(&Task::Build, &files, 0)
            .expect("render");
        assert!(prompt.starts_with("Provide the simplest command line required to build the listed files."));
        assert!(prompt.contains("Makefile\nsrc/main.c\n"));
        assert!(!prompt.contains("more files"));
    }

    #[test]
    fn generation_prompt_mentions_omitted_files() {
        let files = vec!["a.rs".to_string()];
        let prompt = engine()
            .render_generation(&Task::Docs, &files, 12)
            .expect("render");
        assert!(prompt.contains("generate documentation for the listed files"));
        assert!(prompt.contains("(and 12 more files not listed)"));
    }

    #[test]
    fn custom_task_goal_reaches_prompt() {
        let task = Task::Custom(CustomTask::new("bench", "run the benchmarks").expect("task"));
        let prompt = engine().render_generation(&task, &[], 0).expect("render");
        assert!(prompt.contains("required to run the benchmarks for the listed files"));
    }

    #[test]
    fn repair_prompt_embeds_command_error_and_platform() {
        let prompt = engine()
            .render_repair("make\n", "sh: make: command not found\n", "linux")
            .expect("render");
        assert!(prompt.contains("'make' failed with the error 'sh: make: command not found'"));
        assert!(prompt.contains("operating system 'linux'"));
        assert!(prompt.contains("'&&'"));
        assert!(prompt.contains("'-y'"));
    }

    #[test]
    fn refactor_prompt_falls_back_to_default_instruction() {
        let prompt = engine()
            .render_refactor("  ", "lib.rs", "fn a() {}\n")
            .expect("render");
        assert!(prompt.contains(DEFAULT_REFACTOR_INSTRUCTION));
        assert!(prompt.contains("File: lib.rs"));
        assert!(prompt.contains("```\nfn a() {}\n```"));
    }

    #[test]
    fn create_prompt_uses_default_and_file_name() {
        let prompt = engine().render_create("", "hello.py").expect("render");
        assert!(prompt.contains("Create a new code file based on this prompt: Create a new code file with meaningful content."));
        assert!(prompt.contains("saved as hello.py"));
    }
}
