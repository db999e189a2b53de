//! Manifest loading.
//!
//! The engine receives a fully built [`Manifest`]; providers deserialize it and
//! check that every name forms a parsable step id. Deeper validation (reachability, transition targets) is left to the tooling
//! that authors manifests.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument};

use crate::core::manifest::Manifest;

pub trait ManifestProvider {
    fn load(&self) -> Result<Manifest>;
}

/// Reads a manifest from a `.toml` or `.json` file.
#[derive(Debug, Clone)]
pub struct FileManifestProvider {
    path: PathBuf,
}

impl FileManifestProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ManifestProvider for FileManifestProvider {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    fn load(&self) -> Result<Manifest> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read manifest {}", self.path.display()))?;
        let manifest: Manifest = match self.path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&contents)
                .with_context(|| format!("parse manifest {}", self.path.display()))?,
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("parse manifest {}", self.path.display()))?,
            _ => bail!(
                "unsupported manifest format {} (expected .toml or .json)",
                self.path.display()
            ),
        };
        manifest
            .validate_names()
            .with_context(|| format!("validate manifest {}", self.path.display()))?;
        debug!(groups = manifest.groups.len(), "manifest loaded");
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step_id::StepId;

    const TOML_MANIFEST: &str = r#"
[Main]
entry_step = "Build"

[Main.steps.Build]
executor = "coder"
transitions = [{ on_outcome = "SUCCESS", action = "RETURN" }]
"#;

    const JSON_MANIFEST: &str = r#"{
  "Main": {
    "entry_step": "Build",
    "steps": {
      "Build": {
        "executor": "coder",
        "transitions": [{ "on_outcome": "SUCCESS", "action": "RETURN" }]
      }
    }
  }
}"#;

    /// The same manifest written in either format loads to the same value.
    #[test]
    fn loads_toml_and_json_alike() {
        let temp = tempfile::tempdir().expect("tempdir");
        let toml_path = temp.path().join("manifest.toml");
        let json_path = temp.path().join("manifest.json");
        fs::write(&toml_path, TOML_MANIFEST).expect("write");
        fs::write(&json_path, JSON_MANIFEST).expect("write");

        let from_toml = FileManifestProvider::new(&toml_path).load().expect("toml");
        let from_json = FileManifestProvider::new(&json_path).load().expect("json");
        assert_eq!(from_toml, from_json);
        assert_eq!(
            from_toml.entry_of("Main").expect("entry"),
            StepId::new("Main", "Build")
        );
    }

    /// A group name containing `__` is rejected at load time.
    #[test]
    fn rejects_separator_in_group_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("manifest.toml");
        fs::write(&path, TOML_MANIFEST.replace("[Main", "[build__phase")).expect("write");
        let err = FileManifestProvider::new(&path).load().expect_err("names");
        assert!(format!("{err:#}").contains("invalid step id"), "{err:#}");
    }

    /// Only `.toml` and `.json` manifests are accepted.
    #[test]
    fn rejects_unknown_extension() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("manifest.yaml");
        fs::write(&path, "Main: {}").expect("write");
        let err = FileManifestProvider::new(&path).load().expect_err("yaml");
        assert!(err.to_string().contains("unsupported manifest format"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(
            FileManifestProvider::new(temp.path().join("nope.toml"))
                .load()
                .is_err()
        );
    }
}
