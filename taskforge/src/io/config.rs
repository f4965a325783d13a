//! Tool configuration stored under `~/.config/taskforge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::policy::RetryPolicy;

/// Tool configuration (TOML).
///
/// Human-edited. Missing fields default to the values the CLI ships with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForgeConfig {
    /// Default `--retry` budget for generation and execution.
    pub retry_attempts: u32,

    /// Default pause between attempts in milliseconds.
    pub retry_delay_ms: u64,

    /// Shell used as `<shell> -c <command>`.
    pub shell: String,

    /// Captured command output kept for repair prompts.
    pub output_limit_bytes: usize,

    /// Maximum number of file names listed in a generation prompt.
    pub max_listed_files: usize,

    pub suggester: SuggesterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SuggesterConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub api_url: String,
    pub model: String,
    pub system_prompt: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Show a spinner on interactive terminals while waiting for a reply.
    pub spinner: bool,
}

impl Default for SuggesterConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4-turbo".to_string(),
            system_prompt: "You are writing software code.".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
            spinner: true,
        }
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_delay_ms: 2_000,
            shell: "bash".to_string(),
            output_limit_bytes: 100_000,
            max_listed_files: 400,
            suggester: SuggesterConfig::default(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shell.trim().is_empty() {
            return Err(anyhow!("shell must not be empty"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.max_listed_files == 0 {
            return Err(anyhow!("max_listed_files must be > 0"));
        }
        if self.suggester.api_url.trim().is_empty() {
            return Err(anyhow!("suggester.api_url must not be empty"));
        }
        if self.suggester.model.trim().is_empty() {
            return Err(anyhow!("suggester.model must not be empty"));
        }
        if self.suggester.api_key_env.trim().is_empty() {
            return Err(anyhow!("suggester.api_key_env must not be empty"));
        }
        if self.suggester.timeout_secs == 0 {
            return Err(anyhow!("suggester.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Retry policy built from CLI overrides, falling back to configured defaults.
    pub fn retry_policy(
        &self,
        retry: Option<u32>,
        exec_retry: Option<u32>,
        delay_ms: Option<u64>,
    ) -> RetryPolicy {
        let attempts = retry.unwrap_or(self.retry_attempts);
        let delay = Duration::from_millis(delay_ms.unwrap_or(self.retry_delay_ms));
        let policy = RetryPolicy::uniform(attempts, delay);
        match exec_retry {
            Some(n) => policy.with_execute_attempts(n),
            None => policy,
        }
    }
}

/// Default config location (`$HOME/.config/taskforge/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("taskforge").join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ForgeConfig::default()`.
pub fn load_config(path: &Path) -> Result<ForgeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = ForgeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ForgeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Load the config at `explicit`, or at the default location when unset.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ForgeConfig> {
    match explicit {
        Some(path) => load_config(path),
        None => match default_config_path() {
            Some(path) => load_config(&path),
            None => Ok(ForgeConfig::default()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ForgeConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "retry_attempts = 5\n\n[suggester]\nmodel = \"gpt-4o\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.retry_attempts, 5);
        assert_eq!(cfg.suggester.model, "gpt-4o");
        assert_eq!(cfg.suggester.api_key_env, "OPENAI_API_KEY");
        assert_eq!(cfg.shell, "bash");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "shell = \"\"\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("shell must not be empty"));
    }

    #[test]
    fn retry_policy_applies_overrides() {
        let cfg = ForgeConfig::default();
        let policy = cfg.retry_policy(None, None, None);
        assert_eq!(policy, RetryPolicy::uniform(3, Duration::from_millis(2_000)));

        let policy = cfg.retry_policy(Some(4), Some(1), Some(0));
        assert_eq!(policy.generate_attempts, 4);
        assert_eq!(policy.execute_attempts, 1);
        assert!(policy.delay.is_zero());
    }
}
