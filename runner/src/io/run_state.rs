//! Run state storage for paused and finished runs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::state::RuntimeState;
use crate::io::fs_util::write_atomic;

/// Load a persisted runtime state.
pub fn load_run_state(path: &Path) -> Result<RuntimeState> {
    debug!(path = %path.display(), "loading run state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read run state {}", path.display()))?;
    let state: RuntimeState = serde_json::from_str(&contents)
        .with_context(|| format!("parse run state {}", path.display()))?;
    debug!(run_id = %state.run_id, iterations = state.iterations, "run state loaded");
    Ok(state)
}

/// Atomically write run state to disk (temp file + rename).
pub fn write_run_state(path: &Path, state: &RuntimeState) -> Result<()> {
    debug!(path = %path.display(), run_id = %state.run_id, iterations = state.iterations, "writing run state");
    let mut buf = serde_json::to_string_pretty(state).context("serialize run state")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
