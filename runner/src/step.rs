//! One iteration of the run loop.

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::core::action::{Action, CallSite, interpret};
use crate::core::context::{AssemblyInputs, assemble};
use crate::core::error::EngineError;
use crate::core::manifest::Manifest;
use crate::core::state::{RuntimeState, StepLogEntry, TransitionRecord};
use crate::core::step_id::StepId;
use crate::core::transition::resolve;
use crate::core::types::RunMetadata;
use crate::io::artifacts::read_artifact;
use crate::io::executor::{ExecutorService, WorkOrder};

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub iteration: u64,
    pub step: StepId,
    pub executor: String,
    pub outcome: String,
    pub action: Action,
    /// Step selected next; `None` when the run terminated.
    pub next: Option<StepId>,
}

/// Execute the step at `state.current` and advance `state`.
///
/// Any error is fatal for the run. The caller must not invoke this when
/// `state.current` is `None`.
#[instrument(skip_all, fields(run_id = %state.run_id, iteration = state.iterations + 1))]
pub async fn run_step<E: ExecutorService + ?Sized>(
    manifest: &Manifest,
    executor: &E,
    sandbox: &Path,
    state: &mut RuntimeState,
) -> Result<StepOutcome, EngineError> {
    let current = state.current.clone().ok_or(EngineError::NothingToResume)?;
    let step = manifest.step(&current)?;
    let iteration = state.iterations + 1;

    let artifacts = step
        .artifacts
        .iter()
        .map(|path| {
            read_artifact(sandbox, path).map_err(|source| EngineError::Artifact {
                step: current.clone(),
                path: path.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let profile = executor.profile(&step.executor);
    let metadata = RunMetadata {
        run_id: state.run_id.clone(),
        sandbox_path: sandbox.display().to_string(),
        iteration,
    };
    let context = assemble(&AssemblyInputs {
        manifest,
        step_id: &current,
        payload: &state.payload,
        call_stack: &state.call_stack,
        profile: profile.as_ref(),
        artifacts: &artifacts,
        metadata: &metadata,
    })?;
    debug!(step = %current, entries = context.len(), "context assembled");

    info!(step = %current, executor = %step.executor, "dispatching step");
    let result = executor
        .execute(WorkOrder {
            executor_ref: step.executor.clone(),
            context: context.clone(),
            sandbox_path: sandbox.to_path_buf(),
        })
        .await
        .map_err(|source| EngineError::Executor {
            step: current.clone(),
            executor: step.executor.clone(),
            source,
        })?;

    state.payload = result.new_payload;

    let transition = resolve(&current, step, &result.outcome)?;
    let site = CallSite {
        manifest,
        current: &current,
    };
    let (action, reduction) = interpret(&transition.action, state.call_stack.clone(), &site)?;
    if let Action::Call { group } = &action {
        debug!(group = %group, depth = reduction.stack.len(), "entered group");
    }
    if let Action::Return = &action {
        debug!(depth = reduction.stack.len(), "returned from group");
    }

    info!(
        step = %current,
        outcome = %result.outcome,
        action = %action,
        next = ?reduction.next.as_ref().map(ToString::to_string),
        "step finished"
    );

    state.log.push(StepLogEntry {
        iteration,
        step: current.clone(),
        executor: step.executor.clone(),
        input: context,
        output: state.payload.clone(),
        outcome: result.outcome.clone(),
        action: transition.action.clone(),
    });
    state.last_transition = Some(TransitionRecord {
        from: current.clone(),
        outcome: result.outcome.clone(),
        matched: transition.on_outcome.clone(),
        action: transition.action.clone(),
        to: reduction.next.clone(),
    });
    state.completed.push(current.clone());
    state.iterations = iteration;
    state.call_stack = reduction.stack;
    state.current = reduction.next.clone();

    Ok(StepOutcome {
        iteration,
        step: current,
        executor: step.executor.clone(),
        outcome: result.outcome,
        action,
        next: reduction.next,
    })
}

