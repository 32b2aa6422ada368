//! Stable exit codes for foundry CLI commands.

/// Command succeeded, including an agent stopped by a graceful shutdown.
pub const OK: i32 = 0;
/// Command failed: bad config, missing session for `--resume`, or a loop error.
pub const FAILURE: i32 = 1;
/// Second Ctrl+C: the agent exited without finishing its turn.
pub const INTERRUPTED: i32 = 1;
