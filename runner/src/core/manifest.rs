//! The declared graph of work: groups of steps and their transition tables.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;
use crate::core::plan::PayloadOp;
use crate::core::step_id::StepId;

/// Maps one outcome keyword to one raw action instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub on_outcome: String,
    pub action: String,
}

impl Transition {
    pub fn new(on_outcome: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            on_outcome: on_outcome.into(),
            action: action.into(),
        }
    }
}

/// A stateless unit of work: context in, new payload and one outcome out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Name of the executor handler that runs this step.
    pub executor: String,
    /// Step-specific instructions for the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload_plan: Vec<PayloadOp>,
    /// Sandbox-relative files re-read before every execution of this step.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

/// A named container of steps bounding static-context inheritance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub entry_step: String,
    #[serde(default = "default_inherits")]
    pub inherits_context: bool,
    #[serde(default)]
    pub static_context: IndexMap<String, String>,
    /// Steps in declaration order; the order defines call return addresses.
    #[serde(default)]
    pub steps: IndexMap<String, StepDefinition>,
}

fn default_inherits() -> bool {
    true
}

/// The whole program: group name to group definition. Immutable for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub groups: BTreeMap<String, GroupDefinition>,
}

impl Manifest {
    pub fn new(groups: BTreeMap<String, GroupDefinition>) -> Self {
        Self { groups }
    }

    pub fn group(&self, name: &str) -> Result<&GroupDefinition, EngineError> {
        self.groups
            .get(name)
            .ok_or_else(|| EngineError::UnknownGroup {
                group: name.to_string(),
            })
    }

    pub fn step(&self, id: &StepId) -> Result<&StepDefinition, EngineError> {
        self.group(&id.group)?
            .steps
            .get(&id.step)
            .ok_or_else(|| EngineError::UnknownStep { id: id.clone() })
    }

    /// The entry step of `group`, checked to exist.
    pub fn entry_of(&self, group: &str) -> Result<StepId, EngineError> {
        let definition = self.group(group)?;
        let id = StepId::from_parts(group, &definition.entry_step)?;
        if !definition.steps.contains_key(&id.step) {
            return Err(EngineError::UnknownStep { id });
        }
        Ok(id)
    }

    /// The step declared immediately after `id` in its group, if any.
    pub fn step_after(&self, id: &StepId) -> Result<Option<StepId>, EngineError> {
        let group = self.group(&id.group)?;
        let index = group
            .steps
            .get_index_of(&id.step)
            .ok_or_else(|| EngineError::UnknownStep { id: id.clone() })?;
        group
            .steps
            .get_index(index + 1)
            .map(|(name, _)| StepId::from_parts(&id.group, name))
            .transpose()
    }

    /// Every group and step name must form a parsable composite id.
    pub fn validate_names(&self) -> Result<(), EngineError> {
        for (group, definition) in &self.groups {
            for step in definition.steps.keys() {
                StepId::from_parts(group, step)?;
            }
        }
        Ok(())
    }
}
