//! Stable exit codes for graph-runner CLI commands.

/// The run completed (no next step) or the command succeeded.
pub const OK: i32 = 0;
/// A fatal error: invalid manifest/config, unmatched outcome, executor failure.
pub const FATAL: i32 = 1;
/// The run was paused; its state was persisted for `graph-runner resume`.
pub const PAUSED: i32 = 2;
