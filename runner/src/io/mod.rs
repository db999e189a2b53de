//! Side-effecting collaborators of the engine: processes, files, sinks.

pub mod agent;
pub mod artifacts;
pub mod command;
pub mod config;
pub mod executor;
mod fs_util;
pub mod manifest_store;
pub mod process;
pub mod prompt;
pub mod run_state;
pub mod sandbox;
pub mod sink;
