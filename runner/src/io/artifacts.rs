//! Primary artifact reads from the sandbox.
//!
//! Artifacts are read fresh for every step so that edits made by one step are
//! visible to the next. A file that does not exist yet is not an error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::core::types::Artifact;

/// Read `rel_path` under `sandbox`. Missing files yield `content: None`.
pub fn read_artifact(sandbox: &Path, rel_path: &str) -> Result<Artifact> {
    validate_relative(rel_path)?;
    let path = sandbox.join(rel_path);
    let content = match fs::read(&path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "artifact not present");
            None
        }
        Err(err) => {
            return Err(err).with_context(|| format!("read artifact {}", path.display()));
        }
    };
    Ok(Artifact {
        path: rel_path.to_string(),
        content,
    })
}

fn validate_relative(rel_path: &str) -> Result<()> {
    if rel_path.trim().is_empty() {
        bail!("artifact path is empty");
    }
    for component in Path::new(rel_path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => bail!("artifact path escapes the sandbox: {rel_path}"),
            Component::RootDir | Component::Prefix(_) => {
                bail!("artifact path must be relative: {rel_path}")
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Existing files are read relative to the sandbox.
    #[test]
    fn reads_existing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src")).expect("mkdir");
        fs::write(temp.path().join("src/lib.rs"), "pub fn f() {}").expect("write");

        let artifact = read_artifact(temp.path(), "src/lib.rs").expect("read");
        assert_eq!(artifact.path, "src/lib.rs");
        assert_eq!(artifact.content.as_deref(), Some("pub fn f() {}"));
    }

    /// A missing file is not an error; it yields no content.
    #[test]
    fn missing_file_has_no_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = read_artifact(temp.path(), "PLAN.md").expect("read");
        assert_eq!(artifact.content, None);
    }

    /// Absolute paths and `..` components are rejected.
    #[test]
    fn rejects_paths_outside_the_sandbox() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(read_artifact(temp.path(), "../secret").is_err());
        assert!(read_artifact(temp.path(), "/etc/passwd").is_err());
        assert!(read_artifact(temp.path(), "").is_err());
    }

    /// Every read sees the file as it is now.
    #[test]
    fn reads_are_fresh() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("notes.md"), "v1").expect("write");
        let first = read_artifact(temp.path(), "notes.md").expect("read");
        fs::write(temp.path().join("notes.md"), "v2").expect("write");
        let second = read_artifact(temp.path(), "notes.md").expect("read");
        assert_eq!(first.content.as_deref(), Some("v1"));
        assert_eq!(second.content.as_deref(), Some("v2"));
    }
}
