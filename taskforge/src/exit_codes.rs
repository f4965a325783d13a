//! Stable exit codes for taskforge CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments/config, persistence failure, or other errors.
pub const INVALID: i32 = 1;
/// No usable command could be generated within the budget.
pub const GENERATION_FAILED: i32 = 2;
/// The last attempt ended with the command itself failing.
pub const EXECUTION_FAILED: i32 = 3;
/// The last attempt ended with dependency repair producing nothing usable.
pub const REPAIR_FAILED: i32 = 4;
