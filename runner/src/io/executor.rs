//! Executor service abstraction and the registry of tagged handlers.
//!
//! The engine talks to a single [`ExecutorService`]. [`ExecutorRegistry`] is the
//! production service: it resolves a step's executor name to a handler that was
//! registered explicitly at startup. Tests use scripted services that return
//! predetermined outcomes without spawning processes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::types::{ExecutorProfile, Payload};

/// Request sent to the executor service for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub executor_ref: String,
    pub context: Payload,
    pub sandbox_path: PathBuf,
}

impl WorkOrder {
    /// Value of a run metadata entry (`meta:<key>`) in the context.
    pub fn metadata(&self, key: &str) -> Option<&str> {
        let id = format!("meta:{key}");
        self.context
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.content.as_str())
    }

    /// A stable id for an entry this executor appends, unique within the run.
    pub fn entry_id(&self, prefix: &str) -> String {
        format!(
            "{prefix}:{}:{}",
            self.metadata("step_id").unwrap_or("unknown"),
            self.metadata("iteration").unwrap_or("0")
        )
    }
}

/// What the executor service returns for one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorResult {
    /// Replaces the running payload wholesale.
    pub new_payload: Payload,
    pub outcome: String,
}

/// The engine's single dependency for running work.
///
/// Domain failures must be reported as outcomes. An `Err` means the service
/// itself failed and ends the run.
#[async_trait]
pub trait ExecutorService: Send + Sync {
    async fn execute(&self, order: WorkOrder) -> Result<ExecutorResult>;

    /// Persona and settings contributed to the step contract layer.
    fn profile(&self, executor_ref: &str) -> Option<ExecutorProfile>;
}

#[async_trait]
impl<T: ExecutorService + ?Sized> ExecutorService for Arc<T> {
    async fn execute(&self, order: WorkOrder) -> Result<ExecutorResult> {
        (**self).execute(order).await
    }

    fn profile(&self, executor_ref: &str) -> Option<ExecutorProfile> {
        (**self).profile(executor_ref)
    }
}

/// One concrete executor (a model call or a local tool).
#[async_trait]
pub trait ExecutorHandler: Send + Sync {
    async fn handle(&self, order: WorkOrder) -> Result<ExecutorResult>;

    fn profile(&self) -> ExecutorProfile {
        ExecutorProfile::default()
    }
}

/// Name-to-handler registry populated by explicit registration.
#[derive(Default, Clone)]
pub struct ExecutorRegistry {
    handlers: BTreeMap<String, Arc<dyn ExecutorHandler>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ExecutorHandler>,
    ) -> Result<()> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            bail!("executor '{name}' is already registered");
        }
        debug!(executor = %name, "registered executor");
        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    fn handler(&self, name: &str) -> Result<&Arc<dyn ExecutorHandler>> {
        self.handlers
            .get(name)
            .ok_or_else(|| anyhow!("no executor registered under '{name}'"))
    }
}

#[async_trait]
impl ExecutorService for ExecutorRegistry {
    #[instrument(skip_all, fields(executor = %order.executor_ref))]
    async fn execute(&self, order: WorkOrder) -> Result<ExecutorResult> {
        let handler = Arc::clone(self.handler(&order.executor_ref)?);
        let result = handler.handle(order).await?;
        debug!(outcome = %result.outcome, entries = result.new_payload.len(), "executor finished");
        Ok(result)
    }

    fn profile(&self, executor_ref: &str) -> Option<ExecutorProfile> {
        self.handlers.get(executor_ref).map(|handler| handler.profile())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ContextEntry;

    struct Echo;

    #[async_trait]
    impl ExecutorHandler for Echo {
        async fn handle(&self, order: WorkOrder) -> Result<ExecutorResult> {
            let mut new_payload = order.context.conversation();
            new_payload.push(ContextEntry::new(order.entry_id("echo"), "message", "echo"));
            Ok(ExecutorResult {
                new_payload,
                outcome: "SUCCESS".to_string(),
            })
        }

        fn profile(&self) -> ExecutorProfile {
            ExecutorProfile {
                persona: Some("echoes".to_string()),
                ..ExecutorProfile::default()
            }
        }
    }

    fn order(executor_ref: &str) -> WorkOrder {
        WorkOrder {
            executor_ref: executor_ref.to_string(),
            context: Payload::from(vec![
                ContextEntry::new("m1", "message", "hi"),
                ContextEntry::new("meta:step_id", "metadata", "Main__Start"),
                ContextEntry::new("meta:iteration", "metadata", "4"),
            ]),
            sandbox_path: PathBuf::from("/tmp"),
        }
    }

    /// Orders reach the handler registered under their executor ref.
    #[tokio::test]
    async fn dispatches_by_name() {
        let mut registry = ExecutorRegistry::new();
        registry.register("echo", Arc::new(Echo)).expect("register");

        let result = registry.execute(order("echo")).await.expect("execute");
        assert_eq!(result.outcome, "SUCCESS");
        let ids: Vec<&str> = result
            .new_payload
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(ids, vec!["m1", "echo:Main__Start:4"]);
        assert_eq!(
            registry.profile("echo").and_then(|p| p.persona),
            Some("echoes".to_string())
        );
    }

    /// An unregistered executor ref is an infrastructure error.
    #[tokio::test]
    async fn unknown_executor_is_an_error() {
        let registry = ExecutorRegistry::new();
        let err = registry.execute(order("ghost")).await.expect_err("missing");
        assert!(err.to_string().contains("ghost"));
        assert!(registry.profile("ghost").is_none());
    }

    /// A name can be registered only once.
    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = ExecutorRegistry::new();
        registry.register("echo", Arc::new(Echo)).expect("first");
        assert!(registry.register("echo", Arc::new(Echo)).is_err());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["echo"]);
    }
}
