//! Observability snapshots published after every iteration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::action::Frame;
use crate::core::manifest::{Manifest, Transition};
use crate::core::state::{RuntimeState, StepLogEntry, TransitionRecord};
use crate::core::step_id::StepId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Not executed yet in this run.
    Pending,
    /// Selected to execute next.
    Active,
    /// Executed at least once and not currently selected.
    Completed,
}

/// Static shape of the manifest, for rendering the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphShape {
    pub groups: Vec<GroupShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupShape {
    pub name: String,
    pub entry_step: String,
    pub inherits_context: bool,
    pub steps: Vec<StepShape>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepShape {
    pub id: StepId,
    pub executor: String,
    pub transitions: Vec<Transition>,
}

impl GraphShape {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let groups = manifest
            .groups
            .iter()
            .map(|(name, group)| GroupShape {
                name: name.clone(),
                entry_step: group.entry_step.clone(),
                inherits_context: group.inherits_context,
                steps: group
                    .steps
                    .iter()
                    .map(|(step, definition)| StepShape {
                        id: StepId::new(name.clone(), step.clone()),
                        executor: definition.executor.clone(),
                        transitions: definition.transitions.clone(),
                    })
                    .collect(),
            })
            .collect();
        Self { groups }
    }

    pub fn step_ids(&self) -> impl Iterator<Item = &StepId> {
        self.groups
            .iter()
            .flat_map(|group| group.steps.iter().map(|step| &step.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepState {
    pub id: StepId,
    pub status: StepStatus,
    pub runs: usize,
}

/// Most recent log entries carried by a snapshot; the full log stays in the
/// runtime state.
pub const SNAPSHOT_LOG_TAIL: usize = 20;

/// Everything a state sink needs to render the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub status: RunStatus,
    pub iterations: u64,
    pub current: Option<StepId>,
    pub call_stack: Vec<Frame>,
    pub graph: GraphShape,
    pub steps: Vec<StepState>,
    pub last_transition: Option<TransitionRecord>,
    /// Total number of log entries in the run so far.
    #[serde(default)]
    pub log_len: usize,
    /// The last [`SNAPSHOT_LOG_TAIL`] log entries, oldest first.
    pub log: Vec<StepLogEntry>,
}

impl RunSnapshot {
    pub fn capture(graph: &GraphShape, state: &RuntimeState, status: RunStatus) -> Self {
        let mut run_counts: HashMap<&StepId, usize> = HashMap::new();
        for done in &state.completed {
            *run_counts.entry(done).or_default() += 1;
        }
        let steps = graph
            .step_ids()
            .map(|id| {
                let runs = run_counts.get(id).copied().unwrap_or_default();
                let status = if state.current.as_ref() == Some(id) {
                    StepStatus::Active
                } else if runs > 0 {
                    StepStatus::Completed
                } else {
                    StepStatus::Pending
                };
                StepState {
                    id: id.clone(),
                    status,
                    runs,
                }
            })
            .collect();
        Self {
            run_id: state.run_id.clone(),
            status,
            iterations: state.iterations,
            current: state.current.clone(),
            call_stack: state.call_stack.clone(),
            graph: graph.clone(),
            steps,
            last_transition: state.last_transition.clone(),
            log_len: state.log.len(),
            log: state.log[state.log.len().saturating_sub(SNAPSHOT_LOG_TAIL)..].to_vec(),
        }
    }

    pub fn step(&self, id: &StepId) -> Option<&StepState> {
        self.steps.iter().find(|step| &step.id == id)
    }
}
