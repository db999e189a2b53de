//! Payload assembly plans: a closed pipeline of operations over the running payload.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::types::{ContextEntry, Payload};

/// One operation of a step's payload assembly plan.
///
/// Serialized as an inline table tagged by `op`, e.g. `{ op = "last", count = 4 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PayloadOp {
    /// Keep the first `count` entries.
    First { count: usize },
    /// Keep the last `count` entries.
    Last { count: usize },
    /// Keep only entries whose kind is listed.
    IncludeKinds { kinds: Vec<String> },
    /// Drop entries whose kind is listed.
    ExcludeKinds { kinds: Vec<String> },
    /// Keep only the latest entry for each id, preserving the order of survivors.
    Dedupe,
    /// Reverse the order of entries.
    Reverse,
}

/// Apply `plan` to `payload` in declared order. An empty plan returns the payload
/// unchanged.
pub fn apply_plan(payload: &Payload, plan: &[PayloadOp]) -> Payload {
    let mut entries: Vec<ContextEntry> = payload.entries().to_vec();
    for op in plan {
        entries = apply_op(entries, op);
    }
    Payload::from(entries)
}

fn apply_op(mut entries: Vec<ContextEntry>, op: &PayloadOp) -> Vec<ContextEntry> {
    match op {
        PayloadOp::First { count } => {
            entries.truncate(*count);
            entries
        }
        PayloadOp::Last { count } => {
            let skip = entries.len().saturating_sub(*count);
            entries.split_off(skip)
        }
        PayloadOp::IncludeKinds { kinds } => entries
            .into_iter()
            .filter(|entry| kinds.iter().any(|kind| *kind == entry.kind))
            .collect(),
        PayloadOp::ExcludeKinds { kinds } => entries
            .into_iter()
            .filter(|entry| !kinds.iter().any(|kind| *kind == entry.kind))
            .collect(),
        PayloadOp::Dedupe => {
            let mut seen = HashSet::new();
            let mut kept: Vec<ContextEntry> = entries
                .into_iter()
                .rev()
                .filter(|entry| seen.insert(entry.id.clone()))
                .collect();
            kept.reverse();
            kept
        }
        PayloadOp::Reverse => {
            entries.reverse();
            entries
        }
    }
}
