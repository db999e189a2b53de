//! Mutable runtime state owned by one engine for the duration of one run.

use serde::{Deserialize, Serialize};

use crate::core::action::Frame;
use crate::core::step_id::StepId;
use crate::core::types::Payload;

/// The transition applied at the end of the latest iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: StepId,
    /// Outcome emitted by the executor.
    pub outcome: String,
    /// Transition key that matched (the outcome itself or the fallback keyword).
    pub matched: String,
    pub action: String,
    /// Step selected next; `None` when the run terminated.
    pub to: Option<StepId>,
}

/// Per-iteration input/output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub iteration: u64,
    pub step: StepId,
    pub executor: String,
    pub input: Payload,
    pub output: Payload,
    pub outcome: String,
    pub action: String,
}

/// Runtime state of a run. Serializable so an external store can persist a
/// paused run; the manifest itself is never part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeState {
    pub run_id: String,
    pub current: Option<StepId>,
    pub payload: Payload,
    pub call_stack: Vec<Frame>,
    /// Completed step executions, in execution order.
    pub completed: Vec<StepId>,
    pub last_transition: Option<TransitionRecord>,
    /// Number of iterations executed so far.
    pub iterations: u64,
    #[serde(default)]
    pub log: Vec<StepLogEntry>,
}

impl RuntimeState {
    /// Fresh state positioned at `entry`.
    pub fn starting_at(run_id: impl Into<String>, entry: StepId) -> Self {
        Self {
            run_id: run_id.into(),
            current: Some(entry),
            ..Self::default()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.current.is_none()
    }
}
