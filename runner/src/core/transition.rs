//! Outcome to transition resolution.

use crate::core::error::EngineError;
use crate::core::manifest::{StepDefinition, Transition};
use crate::core::step_id::StepId;

/// Reserved outcome a transition table may declare as its catch-all. Executors
/// must never emit it themselves.
pub const FALLBACK_OUTCOME: &str = "FALLBACK";

/// Pick the transition for `outcome`: an exact match first, then the fallback.
///
/// Returns [`EngineError::NoTransition`] when neither exists; the engine treats
/// that as fatal rather than as a quiet stop.
pub fn resolve<'a>(
    id: &StepId,
    step: &'a StepDefinition,
    outcome: &str,
) -> Result<&'a Transition, EngineError> {
    if outcome == FALLBACK_OUTCOME {
        return Err(EngineError::ReservedOutcome {
            step: id.clone(),
            outcome: outcome.to_string(),
        });
    }
    step.transitions
        .iter()
        .find(|transition| transition.on_outcome == outcome)
        .or_else(|| {
            step.transitions
                .iter()
                .find(|transition| transition.on_outcome == FALLBACK_OUTCOME)
        })
        .ok_or_else(|| EngineError::NoTransition {
            step: id.clone(),
            outcome: outcome.to_string(),
        })
}
