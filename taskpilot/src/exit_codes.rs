//! Stable exit codes for taskpilot CLI commands.

/// Command succeeded (a task ran, even if it ended in review).
pub const OK: i32 = 0;
/// Invalid config, task file, arguments, or any other error.
pub const INVALID: i32 = 1;
/// `taskpilot run` found no approved pending task.
pub const IDLE: i32 = 2;
/// No registered agent passed its availability probe.
pub const NO_AGENT: i32 = 3;
/// Interactive provider selection was cancelled.
pub const CANCELLED: i32 = 4;
