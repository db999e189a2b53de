//! The execution engine: owns one run's state and drives the loop.
//!
//! One [`Engine`] exists per run. Engines share nothing but the immutable
//! manifest, so several runs can be driven concurrently on one runtime.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, instrument, warn};

use crate::core::error::EngineError;
use crate::core::manifest::Manifest;
use crate::core::snapshot::{GraphShape, RunSnapshot, RunStatus};
use crate::core::state::RuntimeState;
use crate::core::step_id::StepId;
use crate::io::executor::ExecutorService;
use crate::io::sink::StateSink;
use crate::step::run_step;

/// How a call to [`Engine::run`] or [`Engine::resume`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunCompletion {
    /// No next step: the graph terminated.
    Completed { iterations: u64 },
    /// The pause flag was observed; `at` will run first on resume.
    Paused { at: StepId },
}

/// Shared flag checked at the top of every iteration.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Fail with [`EngineError::StepLimitExceeded`] after this many iterations.
    pub max_steps: Option<u64>,
    /// Run id to use instead of a generated one.
    pub run_id: Option<String>,
}

pub struct Engine<E, S> {
    manifest: Arc<Manifest>,
    executor: E,
    sink: S,
    options: EngineOptions,
    pause: PauseHandle,
    graph: GraphShape,
    state: RuntimeState,
}

impl<E: ExecutorService, S: StateSink> Engine<E, S> {
    pub fn new(manifest: Arc<Manifest>, executor: E, sink: S) -> Self {
        let graph = GraphShape::from_manifest(&manifest);
        Self {
            manifest,
            executor,
            sink,
            options: EngineOptions::default(),
            pause: PauseHandle::default(),
            graph,
            state: RuntimeState::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Continue from a previously persisted state (see [`Engine::resume`]).
    pub fn with_state(mut self, state: RuntimeState) -> Self {
        self.state = state;
        self
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn snapshot(&self, status: RunStatus) -> RunSnapshot {
        RunSnapshot::capture(&self.graph, &self.state, status)
    }

    /// Start a fresh run at the entry step of `start_group`. A pause requested
    /// before this call is discarded.
    #[instrument(skip_all, fields(start_group = %start_group))]
    pub async fn run(
        &mut self,
        start_group: &str,
        sandbox: &Path,
    ) -> Result<RunCompletion, EngineError> {
        self.manifest.validate_names()?;
        let entry = self.manifest.entry_of(start_group)?;
        self.pause.clear();
        let run_id = self.options.run_id.clone().unwrap_or_else(new_run_id);
        info!(run_id = %run_id, entry = %entry, sandbox = %sandbox.display(), "starting run");
        self.state = RuntimeState::starting_at(run_id, entry);
        self.drive(sandbox).await
    }

    /// Continue a paused or restored run exactly where it stopped.
    #[instrument(skip_all, fields(run_id = %self.state.run_id))]
    pub async fn resume(&mut self, sandbox: &Path) -> Result<RunCompletion, EngineError> {
        let Some(current) = &self.state.current else {
            return Err(EngineError::NothingToResume);
        };
        self.manifest.validate_names()?;
        info!(at = %current, iterations = self.state.iterations, "resuming run");
        self.pause.clear();
        self.drive(sandbox).await
    }

    async fn drive(&mut self, sandbox: &Path) -> Result<RunCompletion, EngineError> {
        loop {
            if self.pause.is_paused() {
                if let Some(at) = self.state.current.clone() {
                    info!(at = %at, "run paused");
                    self.publish(RunStatus::Paused);
                    return Ok(RunCompletion::Paused { at });
                }
            }
            if self.state.current.is_none() {
                info!(iterations = self.state.iterations, "run completed");
                self.publish(RunStatus::Completed);
                return Ok(RunCompletion::Completed {
                    iterations: self.state.iterations,
                });
            }
            if let Some(limit) = self.options.max_steps {
                if self.state.iterations >= limit {
                    warn!(limit, "step limit reached");
                    return Err(EngineError::StepLimitExceeded { limit });
                }
            }
            run_step(&self.manifest, &self.executor, sandbox, &mut self.state).await?;
            self.publish(RunStatus::Running);
        }
    }

    fn publish(&self, status: RunStatus) {
        self.sink.publish(&self.snapshot(status));
    }
}

fn new_run_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("run-{nanos:x}")
}
