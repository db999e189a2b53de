//! Local tool executor: runs a command in the sandbox and maps its exit status to
//! an outcome.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::core::types::{ContextEntry, ExecutorProfile, kinds};
use crate::io::executor::{ExecutorHandler, ExecutorResult, WorkOrder};
use crate::io::process::{CommandRequest, run_command};

/// Outcome keywords a command executor reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcomes {
    pub success: String,
    pub failure: String,
    pub timeout: String,
}

impl Default for CommandOutcomes {
    fn default() -> Self {
        Self {
            success: "SUCCESS".to_string(),
            failure: "FAILURE".to_string(),
            timeout: "TIMEOUT".to_string(),
        }
    }
}

/// Runs `argv` in the sandbox. The assembled context is written to stdin as JSON
/// when `pass_context` is set. The exit status becomes the outcome and the
/// captured output is appended to the conversation as a `tool_output` entry.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    pub argv: Vec<String>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
    pub pass_context: bool,
    pub outcomes: CommandOutcomes,
    pub profile: ExecutorProfile,
}

impl CommandExecutor {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            timeout: Duration::from_secs(10 * 60),
            output_limit_bytes: 100_000,
            pass_context: false,
            outcomes: CommandOutcomes::default(),
            profile: ExecutorProfile::default(),
        }
    }
}

#[async_trait]
impl ExecutorHandler for CommandExecutor {
    #[instrument(skip_all, fields(program = self.argv.first().map(String::as_str)))]
    async fn handle(&self, order: WorkOrder) -> Result<ExecutorResult> {
        let stdin = if self.pass_context {
            Some(serde_json::to_vec(&order.context).context("serialize context")?)
        } else {
            None
        };
        info!(workdir = %order.sandbox_path.display(), "running command executor");
        let output = run_command(CommandRequest {
            argv: self.argv.clone(),
            workdir: order.sandbox_path.clone(),
            stdin,
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        })
        .await?;

        let outcome = if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "command timed out");
            &self.outcomes.timeout
        } else if output.status.success() {
            &self.outcomes.success
        } else {
            &self.outcomes.failure
        };

        let mut new_payload = order.context.conversation();
        new_payload.push(ContextEntry::new(
            order.entry_id("tool"),
            kinds::TOOL_OUTPUT,
            format!(
                "$ {}\nexit: {:?}\n{}",
                self.argv.join(" "),
                output.status.code(),
                output.render_log()
            ),
        ));
        Ok(ExecutorResult {
            new_payload,
            outcome: outcome.clone(),
        })
    }

    fn profile(&self) -> ExecutorProfile {
        self.profile.clone()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::types::Payload;

    fn order(sandbox: &std::path::Path) -> WorkOrder {
        WorkOrder {
            executor_ref: "check".to_string(),
            context: Payload::from(vec![
                ContextEntry::new("m1", kinds::MESSAGE, "previous"),
                ContextEntry::new("meta:step_id", kinds::METADATA, "Main__Check"),
                ContextEntry::new("meta:iteration", kinds::METADATA, "2"),
            ]),
            sandbox_path: sandbox.to_path_buf(),
        }
    }

    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ])
    }

    /// Exit 0 is SUCCESS, and the prior conversation is carried into the new payload.
    #[tokio::test]
    async fn zero_exit_maps_to_success_and_keeps_history() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = sh("echo checked").handle(order(temp.path())).await.expect("run");

        assert_eq!(result.outcome, "SUCCESS");
        let entries = result.new_payload.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "m1");
        assert_eq!(entries[1].id, "tool:Main__Check:2");
        assert_eq!(entries[1].kind, kinds::TOOL_OUTPUT);
        assert!(entries[1].content.contains("checked"));
    }

    /// A non-zero exit is a FAILURE outcome, not an infrastructure error.
    #[tokio::test]
    async fn failing_command_is_an_outcome_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = sh("echo broken >&2; exit 1")
            .handle(order(temp.path()))
            .await
            .expect("run");
        assert_eq!(result.outcome, "FAILURE");
    }

    /// The command's working directory is the sandbox.
    #[tokio::test]
    async fn runs_in_the_sandbox() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let result = sh("cat marker.txt").handle(order(temp.path())).await.expect("run");
        assert!(result.new_payload.entries()[1].content.contains("here"));
    }

    /// With `pass_context`, the assembled context arrives on stdin as JSON.
    #[tokio::test]
    async fn passes_context_on_stdin_when_enabled() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut executor = sh("cat");
        executor.pass_context = true;
        let result = executor.handle(order(temp.path())).await.expect("run");
        assert!(result.new_payload.entries()[1].content.contains("\"previous\""));
    }
}
