//! Graph execution engine for multi-step software-construction workflows.
//!
//! A manifest declares groups of steps and, per step, a transition table from
//! outcome keywords to control-flow actions (`JUMP`, `CALL`, `RETURN`). The
//! engine walks that graph: it assembles layered context for the current step,
//! hands it to an external executor, and routes the returned outcome to the next
//! step. It never invents control flow the manifest does not declare.
//!
//! - **[`core`]**: Pure, deterministic logic (step ids, actions, context
//!   assembly, transition lookup, snapshots). No I/O.
//! - **[`io`]**: Side-effecting collaborators (executors, processes, artifacts,
//!   sinks, config and state files).
//!
//! [`engine`] owns the run loop and its state; [`step`] is one iteration of it.

pub mod core;
pub mod engine;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
