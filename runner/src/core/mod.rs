//! Deterministic, pure logic shared by the engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod action;
pub mod context;
pub mod error;
pub mod manifest;
pub mod plan;
pub mod snapshot;
pub mod state;
pub mod step_id;
pub mod transition;
pub mod types;
