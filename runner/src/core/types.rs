//! Shared deterministic types for the graph engine.
//!
//! These types define stable contracts between the pure core, the engine loop and
//! external collaborators. They carry no I/O and serialize deterministically.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Entry kinds produced by the context assembler itself.
///
/// Executors may use any other kind for conversation entries (`message`,
/// `tool_output`, ...). Entries of these kinds are rebuilt every step and are
/// never part of the running history.
pub mod kinds {
    pub const INSTRUCTIONS: &str = "instructions";
    pub const PERSONA: &str = "persona";
    pub const EXECUTOR_CONFIG: &str = "executor_config";
    pub const STATIC_CONTEXT: &str = "static_context";
    pub const ARTIFACT: &str = "artifact";
    pub const METADATA: &str = "metadata";

    /// Conversation entry appended by model executors.
    pub const MESSAGE: &str = "message";
    /// Conversation entry appended by local tool executors.
    pub const TOOL_OUTPUT: &str = "tool_output";

    pub const ENGINE_RESERVED: [&str; 6] = [
        INSTRUCTIONS,
        PERSONA,
        EXECUTOR_CONFIG,
        STATIC_CONTEXT,
        ARTIFACT,
        METADATA,
    ];

    pub fn is_engine_reserved(kind: &str) -> bool {
        ENGINE_RESERVED.contains(&kind)
    }
}

/// One atomic piece of the running context trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: String,
    pub kind: String,
    pub content: String,
}

impl ContextEntry {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            content: content.into(),
        }
    }
}

/// Ordered sequence of context entries passed between steps.
///
/// The payload only ever grows by appending or is replaced wholesale; entries are
/// never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Vec<ContextEntry>);

impl Payload {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, entry: ContextEntry) {
        self.0.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ContextEntry>) {
        self.0.extend(entries);
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ContextEntry> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries that belong to the running history (everything the assembler did
    /// not produce). Executors use this to carry the conversation forward.
    pub fn conversation(&self) -> Payload {
        self.0
            .iter()
            .filter(|entry| !kinds::is_engine_reserved(&entry.kind))
            .cloned()
            .collect()
    }

    /// Entries of the given kind, in order.
    pub fn of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a ContextEntry> + 'a {
        self.0.iter().filter(move |entry| entry.kind == kind)
    }
}

impl From<Vec<ContextEntry>> for Payload {
    fn from(entries: Vec<ContextEntry>) -> Self {
        Self(entries)
    }
}

impl FromIterator<ContextEntry> for Payload {
    fn from_iter<T: IntoIterator<Item = ContextEntry>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Payload {
    type Item = ContextEntry;
    type IntoIter = std::vec::IntoIter<ContextEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Payload {
    type Item = &'a ContextEntry;
    type IntoIter = std::slice::Iter<'a, ContextEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Persona and settings an executor contributes to the step contract layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorProfile {
    pub persona: Option<String>,
    pub settings: IndexMap<String, String>,
}

/// A target file read from the sandbox for the primary artifact layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Sandbox-relative path as declared by the step.
    pub path: String,
    /// File contents; `None` when the file does not exist yet.
    pub content: Option<String>,
}

/// Immutable facts about the run, rendered as the last context layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetadata {
    pub run_id: String,
    pub sandbox_path: String,
    pub iteration: u64,
}
