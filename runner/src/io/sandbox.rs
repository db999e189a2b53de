//! Sandbox provisioning. Isolation itself (worktrees, containers) is out of
//! scope here; the engine only needs a working directory path.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::debug;

pub trait SandboxProvider {
    /// Returns the absolute working directory handed to executors.
    fn prepare(&self) -> Result<PathBuf>;
}

/// An existing directory used as-is.
#[derive(Debug, Clone)]
pub struct DirectorySandbox {
    root: PathBuf,
}

impl DirectorySandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SandboxProvider for DirectorySandbox {
    fn prepare(&self) -> Result<PathBuf> {
        if !self.root.is_dir() {
            bail!("sandbox is not a directory: {}", self.root.display());
        }
        let path = self
            .root
            .canonicalize()
            .with_context(|| format!("canonicalize sandbox {}", self.root.display()))?;
        debug!(sandbox = %path.display(), "sandbox ready");
        Ok(path)
    }
}
