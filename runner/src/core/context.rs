//! Context assembly for a single step.
//!
//! The assembled context is the concatenation of five layers, always in this order:
//!
//! 1. the running payload, shaped by the step's payload plan
//! 2. the step/executor contract (instructions, persona, executor settings)
//! 3. inherited static context, nearest group first
//! 4. primary artifacts, as read from the sandbox for this step
//! 5. run metadata, always last
//!
//! Assembly is pure: artifacts are read by the caller and passed in.

use std::collections::HashSet;

use crate::core::action::Frame;
use crate::core::error::EngineError;
use crate::core::manifest::Manifest;
use crate::core::plan::apply_plan;
use crate::core::step_id::StepId;
use crate::core::types::{Artifact, ContextEntry, ExecutorProfile, Payload, RunMetadata, kinds};

/// Everything needed to build one step's context.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInputs<'a> {
    pub manifest: &'a Manifest,
    pub step_id: &'a StepId,
    pub payload: &'a Payload,
    pub call_stack: &'a [Frame],
    pub profile: Option<&'a ExecutorProfile>,
    pub artifacts: &'a [Artifact],
    pub metadata: &'a RunMetadata,
}

/// Build the ordered context for `inputs.step_id`.
pub fn assemble(inputs: &AssemblyInputs<'_>) -> Result<Payload, EngineError> {
    let step = inputs.manifest.step(inputs.step_id)?;
    let mut context = apply_plan(inputs.payload, &step.payload_plan);

    if let Some(instructions) = step.instructions.as_deref() {
        context.push(ContextEntry::new(
            format!("instructions:{}", inputs.step_id),
            kinds::INSTRUCTIONS,
            instructions,
        ));
    }
    if let Some(profile) = inputs.profile {
        if let Some(persona) = profile.persona.as_deref() {
            context.push(ContextEntry::new(
                format!("persona:{}", step.executor),
                kinds::PERSONA,
                persona,
            ));
        }
        if !profile.settings.is_empty() {
            let rendered = profile
                .settings
                .iter()
                .map(|(key, value)| format!("{key}: {value}"))
                .collect::<Vec<_>>()
                .join("\n");
            context.push(ContextEntry::new(
                format!("executor_config:{}", step.executor),
                kinds::EXECUTOR_CONFIG,
                rendered,
            ));
        }
    }

    for group in inheritance_chain(inputs.manifest, inputs.step_id, inputs.call_stack)? {
        let definition = inputs.manifest.group(group)?;
        for (key, value) in &definition.static_context {
            context.push(ContextEntry::new(
                format!("static:{group}:{key}"),
                kinds::STATIC_CONTEXT,
                value.as_str(),
            ));
        }
    }

    for artifact in inputs.artifacts {
        context.push(ContextEntry::new(
            format!("artifact:{}", artifact.path),
            kinds::ARTIFACT,
            artifact.content.as_deref().unwrap_or_default(),
        ));
    }

    context.extend(metadata_entries(
        inputs.metadata,
        inputs.step_id,
        inputs.call_stack.len(),
    ));
    Ok(context)
}

/// Groups whose static context reaches the current step, nearest first.
///
/// The current group always contributes; when it does not inherit, nothing else
/// does. Ascending through the callers on the stack (top first), the first
/// ancestor that does not inherit is excluded and stops the walk.
pub fn inheritance_chain<'a>(
    manifest: &'a Manifest,
    current: &'a StepId,
    call_stack: &'a [Frame],
) -> Result<Vec<&'a str>, EngineError> {
    let mut chain = vec![current.group.as_str()];
    let mut seen: HashSet<&str> = chain.iter().copied().collect();
    if !manifest.group(&current.group)?.inherits_context {
        return Ok(chain);
    }

    for frame in call_stack.iter().rev() {
        let group = frame.caller.group.as_str();
        if seen.contains(group) {
            continue;
        }
        if !manifest.group(group)?.inherits_context {
            break;
        }
        seen.insert(group);
        chain.push(group);
    }
    Ok(chain)
}

fn metadata_entries(metadata: &RunMetadata, step_id: &StepId, depth: usize) -> Vec<ContextEntry> {
    [
        ("run_id", metadata.run_id.clone()),
        ("sandbox_path", metadata.sandbox_path.clone()),
        ("step_id", step_id.to_string()),
        ("iteration", metadata.iteration.to_string()),
        ("call_depth", depth.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| ContextEntry::new(format!("meta:{key}"), kinds::METADATA, value))
    .collect()
}
