//! Retry budgets for the generate and execute loops.

use std::time::Duration;

/// Bounded retry policy supplied per run.
///
/// `generate_attempts` bounds how many commands are requested from the suggester;
/// `execute_attempts` bounds the execution-retry loop for each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub generate_attempts: u32,
    pub execute_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Same budget for both loops.
    pub fn uniform(max_attempts: u32, delay: Duration) -> Self {
        Self {
            generate_attempts: max_attempts,
            execute_attempts: max_attempts,
            delay,
        }
    }

    /// Override the per-command execution budget.
    pub fn with_execute_attempts(mut self, attempts: u32) -> Self {
        self.execute_attempts = attempts;
        self
    }

    /// Sleep between attempts. Zero delay returns immediately.
    pub fn pause(&self) {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::uniform(3, Duration::from_secs(2))
    }
}
