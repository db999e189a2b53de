//! Composite `<group>__<step>` identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;

/// Separator between the group and step halves of a composite id.
pub const SEPARATOR: &str = "__";

/// A parsed step identifier. Raw strings are converted at every boundary and never
/// pattern-matched downstream.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepId {
    pub group: String,
    pub step: String,
}

impl StepId {
    pub fn new(group: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            step: step.into(),
        }
    }

    /// Build an id from manifest names, rejecting names whose composite form
    /// would not parse back to the same halves.
    pub fn from_parts(group: &str, step: &str) -> Result<Self, EngineError> {
        let id = Self::new(group, step);
        let invalid = |reason| EngineError::InvalidStepId {
            raw: id.to_string(),
            reason,
        };
        if group.is_empty() {
            return Err(invalid("empty group name"));
        }
        if step.is_empty() {
            return Err(invalid("empty step name"));
        }
        if group.contains(SEPARATOR) || step.contains(SEPARATOR) {
            return Err(invalid("name contains the '__' separator"));
        }
        if Self::parse(&id.to_string()).ok().as_ref() != Some(&id) {
            return Err(invalid("name does not round-trip through the '__' separator"));
        }
        Ok(id)
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let invalid = |reason| EngineError::InvalidStepId {
            raw: raw.to_string(),
            reason,
        };
        let (group, step) = raw
            .split_once(SEPARATOR)
            .ok_or_else(|| invalid("missing '__' separator"))?;
        if group.is_empty() {
            return Err(invalid("empty group name"));
        }
        if step.is_empty() {
            return Err(invalid("empty step name"));
        }
        if step.contains(SEPARATOR) {
            return Err(invalid("more than one '__' separator"));
        }
        Ok(Self::new(group, step))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.group, SEPARATOR, self.step)
    }
}

impl FromStr for StepId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StepId {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.to_string()
    }
}
