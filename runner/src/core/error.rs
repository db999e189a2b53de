//! Fatal conditions raised by the engine.
//!
//! Every variant ends the run. Ordinary domain failures (a failing test run, a
//! rejected review) are outcome keywords routed through transitions, never errors.

use thiserror::Error;

use crate::core::step_id::StepId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid step id '{raw}': {reason}")]
    InvalidStepId { raw: String, reason: &'static str },

    #[error("unknown group '{group}'")]
    UnknownGroup { group: String },

    #[error("unknown step '{id}'")]
    UnknownStep { id: StepId },

    #[error("invalid action '{raw}' in {step}: {reason}")]
    InvalidAction {
        step: StepId,
        raw: String,
        reason: String,
    },

    #[error(
        "step {step} returned outcome '{outcome}' with no matching transition and no FALLBACK"
    )]
    NoTransition { step: StepId, outcome: String },

    #[error("executor for {step} emitted the reserved outcome '{outcome}'")]
    ReservedOutcome { step: StepId, outcome: String },

    #[error("step limit of {limit} exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("nothing to resume: the run has no current step")]
    NothingToResume,

    #[error("executor '{executor}' failed on {step}")]
    Executor {
        step: StepId,
        executor: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("read artifact '{path}' for {step}")]
    Artifact {
        step: StepId,
        path: String,
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    /// True for errors caused by the manifest's shape rather than by a collaborator.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidStepId { .. }
                | EngineError::UnknownGroup { .. }
                | EngineError::UnknownStep { .. }
                | EngineError::InvalidAction { .. }
                | EngineError::NoTransition { .. }
        )
    }
}
