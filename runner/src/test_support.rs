//! Test-only helpers: manifest builders, a scripted executor, a recording sink
//! and a temporary sandbox.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use crate::core::manifest::{GroupDefinition, Manifest, StepDefinition, Transition};
use crate::core::snapshot::{RunSnapshot, RunStatus};
use crate::core::step_id::StepId;
use crate::core::types::{ContextEntry, ExecutorProfile, kinds};
use crate::engine::PauseHandle;
use crate::io::executor::{ExecutorResult, ExecutorService, WorkOrder};
use crate::io::sink::StateSink;

/// A step run by `executor` with no transitions.
pub fn step(executor: &str) -> StepDefinition {
    StepDefinition {
        executor: executor.to_string(),
        ..StepDefinition::default()
    }
}

/// A step run by `executor` with `(on_outcome, action)` transitions.
pub fn step_on(executor: &str, transitions: &[(&str, &str)]) -> StepDefinition {
    StepDefinition {
        transitions: transitions
            .iter()
            .map(|(outcome, action)| Transition::new(*outcome, *action))
            .collect(),
        ..step(executor)
    }
}

#[derive(Debug, Default)]
pub struct ManifestBuilder {
    groups: BTreeMap<String, GroupDefinition>,
}

impl ManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(
        mut self,
        name: &str,
        entry_step: &str,
        build: impl FnOnce(GroupBuilder) -> GroupBuilder,
    ) -> Self {
        let group = build(GroupBuilder::new(entry_step)).definition;
        self.groups.insert(name.to_string(), group);
        self
    }

    pub fn build(self) -> Manifest {
        Manifest::new(self.groups)
    }
}

#[derive(Debug)]
pub struct GroupBuilder {
    definition: GroupDefinition,
}

impl GroupBuilder {
    fn new(entry_step: &str) -> Self {
        Self {
            definition: GroupDefinition {
                entry_step: entry_step.to_string(),
                inherits_context: true,
                static_context: Default::default(),
                steps: Default::default(),
            },
        }
    }

    pub fn step(mut self, name: &str, definition: StepDefinition) -> Self {
        self.definition.steps.insert(name.to_string(), definition);
        self
    }

    pub fn static_context(mut self, key: &str, value: &str) -> Self {
        self.definition
            .static_context
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn inherits(mut self, inherits_context: bool) -> Self {
        self.definition.inherits_context = inherits_context;
        self
    }
}

#[derive(Default)]
struct Script {
    outcomes: HashMap<StepId, VecDeque<String>>,
    default_outcome: Option<String>,
    failures: HashSet<StepId>,
    writes: HashMap<StepId, Vec<(String, String)>>,
    profiles: BTreeMap<String, ExecutorProfile>,
    pause_after: Option<(usize, PauseHandle)>,
    orders: Vec<WorkOrder>,
}

/// Executor service that answers from a per-step script instead of running work.
///
/// Each execution appends a `message` entry `"<step> -> <outcome>"` to the
/// conversation. Steps without a scripted outcome answer `SUCCESS`. Clones
/// share the script and the recorded work orders.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    script: Arc<Mutex<Script>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `outcome` for `step_id`; queued outcomes are consumed in order.
    pub fn on(self, step_id: &str, outcome: &str) -> Self {
        self.lock()
            .outcomes
            .entry(parse(step_id))
            .or_default()
            .push_back(outcome.to_string());
        self
    }

    /// Outcome used once a step's queue is empty.
    pub fn default_outcome(self, outcome: &str) -> Self {
        self.lock().default_outcome = Some(outcome.to_string());
        self
    }

    /// Fail with an infrastructure error whenever `step_id` runs.
    pub fn fail_on(self, step_id: &str) -> Self {
        self.lock().failures.insert(parse(step_id));
        self
    }

    /// Write `contents` to the sandbox-relative `path` whenever `step_id` runs.
    pub fn writes(self, step_id: &str, path: &str, contents: &str) -> Self {
        self.lock()
            .writes
            .entry(parse(step_id))
            .or_default()
            .push((path.to_string(), contents.to_string()));
        self
    }

    pub fn with_profile(self, executor: &str, profile: ExecutorProfile) -> Self {
        self.lock().profiles.insert(executor.to_string(), profile);
        self
    }

    /// Set `handle` once, after `executions` steps have run in total.
    pub fn pause_after(self, executions: usize, handle: PauseHandle) -> Self {
        self.lock().pause_after = Some((executions, handle));
        self
    }

    pub fn orders(&self) -> Vec<WorkOrder> {
        self.lock().orders.clone()
    }

    /// Step ids in execution order, read from each order's metadata.
    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .orders
            .iter()
            .filter_map(|order| order.metadata("step_id").map(str::to_string))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("script lock")
    }
}

fn parse(step_id: &str) -> StepId {
    StepId::parse(step_id).expect("scripted step id")
}

#[async_trait]
impl ExecutorService for ScriptedExecutor {
    async fn execute(&self, order: WorkOrder) -> Result<ExecutorResult> {
        let mut script = self.lock();
        let step_id = order
            .metadata("step_id")
            .ok_or_else(|| anyhow!("work order without step_id"))?
            .parse::<StepId>()?;
        script.orders.push(order.clone());

        let pause_due =
            matches!(&script.pause_after, Some((after, _)) if script.orders.len() >= *after);
        if pause_due {
            if let Some((_, handle)) = script.pause_after.take() {
                handle.pause();
            }
        }
        if script.failures.contains(&step_id) {
            return Err(anyhow!("scripted failure at {step_id}"));
        }
        for (path, contents) in script.writes.get(&step_id).cloned().unwrap_or_default() {
            let target = order.sandbox_path.join(path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, contents)?;
        }

        let queued = script
            .outcomes
            .get_mut(&step_id)
            .and_then(VecDeque::pop_front);
        let outcome = queued
            .or_else(|| script.default_outcome.clone())
            .unwrap_or_else(|| "SUCCESS".to_string());

        let mut new_payload = order.context.conversation();
        new_payload.push(ContextEntry::new(
            order.entry_id("message"),
            kinds::MESSAGE,
            format!("{step_id} -> {outcome}"),
        ));
        Ok(ExecutorResult {
            new_payload,
            outcome,
        })
    }

    fn profile(&self, executor_ref: &str) -> Option<ExecutorProfile> {
        self.lock().profiles.get(executor_ref).cloned()
    }
}

/// State sink that keeps every published snapshot.
#[derive(Clone, Default)]
pub struct RecordingSink {
    snapshots: Arc<Mutex<Vec<RunSnapshot>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshots(&self) -> Vec<RunSnapshot> {
        self.snapshots.lock().expect("sink lock").clone()
    }

    pub fn statuses(&self) -> Vec<RunStatus> {
        self.snapshots().iter().map(|snapshot| snapshot.status).collect()
    }

    pub fn last(&self) -> Option<RunSnapshot> {
        self.snapshots().pop()
    }
}

impl StateSink for RecordingSink {
    fn publish(&self, snapshot: &RunSnapshot) {
        self.snapshots
            .lock()
            .expect("sink lock")
            .push(snapshot.clone());
    }
}

/// A temporary sandbox directory removed on drop.
pub struct TestSandbox {
    dir: tempfile::TempDir,
}

impl TestSandbox {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create sandbox tempdir")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, rel_path: &str, contents: &str) -> Result<()> {
        let path = self.dir.path().join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    pub fn read(&self, rel_path: &str) -> Result<String> {
        let path = self.dir.path().join(rel_path);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}
