//! Model executor backed by an agent CLI (`codex exec` by default).
//!
//! The assembled context is rendered into a prompt and fed on stdin. The agent
//! writes its final message, constrained by a JSON schema, to an output file whose
//! `outcome` drives the transition lookup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ContextEntry, ExecutorProfile, kinds};
use crate::io::executor::{ExecutorHandler, ExecutorResult, WorkOrder};
use crate::io::process::{CommandRequest, run_command};
use crate::io::prompt::PromptBuilder;

/// Structured final message produced by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub outcome: String,
    pub summary: String,
}

/// Agent CLI settings.
#[derive(Debug, Clone)]
pub struct AgentExecutor {
    /// Executor name, used to namespace scratch files.
    pub name: String,
    /// Agent program, e.g. `codex`.
    pub program: String,
    /// Arguments placed between `exec` and the schema/output flags.
    pub extra_args: Vec<String>,
    /// Outcomes the agent may answer with.
    pub outcomes: Vec<String>,
    pub timeout: Duration,
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    /// Sandbox-relative directory for schema, output and log files.
    pub scratch_dir: PathBuf,
    pub profile: ExecutorProfile,
}

impl AgentExecutor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: "codex".to_string(),
            extra_args: Vec::new(),
            outcomes: vec!["SUCCESS".to_string(), "FAILURE".to_string()],
            timeout: Duration::from_secs(30 * 60),
            prompt_budget_bytes: 40_000,
            output_limit_bytes: 100_000,
            scratch_dir: PathBuf::from(".graph-runner"),
            profile: ExecutorProfile::default(),
        }
    }

    fn output_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["outcome", "summary"],
            "properties": {
                "outcome": { "type": "string", "enum": self.outcomes },
                "summary": { "type": "string" }
            }
        })
    }

    fn argv(&self, schema_path: &Path, output_path: &Path) -> Vec<String> {
        let mut argv = vec![self.program.clone(), "exec".to_string()];
        argv.extend(self.extra_args.iter().cloned());
        argv.extend([
            "--skip-git-repo-check".to_string(),
            "--output-schema".to_string(),
            schema_path.display().to_string(),
            "--output-last-message".to_string(),
            output_path.display().to_string(),
            "-".to_string(),
        ]);
        argv
    }
}

#[async_trait]
impl ExecutorHandler for AgentExecutor {
    #[instrument(skip_all, fields(executor = %self.name, timeout_secs = self.timeout.as_secs()))]
    async fn handle(&self, order: WorkOrder) -> Result<ExecutorResult> {
        let step_id = order.metadata("step_id").unwrap_or("unknown").to_string();
        let iteration = order.metadata("iteration").unwrap_or("0").to_string();
        let dir = order.sandbox_path.join(&self.scratch_dir).join(&self.name);
        fs::create_dir_all(&dir).with_context(|| format!("create scratch dir {}", dir.display()))?;

        let schema_path = dir.join("output.schema.json");
        write_json(&schema_path, &self.output_schema())?;
        let output_path = dir.join(format!("{step_id}.{iteration}.output.json"));
        let log_path = dir.join(format!("{step_id}.{iteration}.log"));
        if output_path.exists() {
            fs::remove_file(&output_path)
                .with_context(|| format!("remove stale output {}", output_path.display()))?;
        }

        let prompt = PromptBuilder::new(self.prompt_budget_bytes)?.build(&order.context, &self.outcomes)?;
        info!(step = %step_id, prompt_bytes = prompt.len(), "starting agent");

        let output = run_command(CommandRequest {
            argv: self.argv(&schema_path, &output_path),
            workdir: order.sandbox_path.clone(),
            stdin: Some(prompt.into_bytes()),
            timeout: self.timeout,
            output_limit_bytes: self.output_limit_bytes,
        })
        .await
        .with_context(|| format!("run {}", self.program))?;

        fs::write(&log_path, output.render_log())
            .with_context(|| format!("write agent log {}", log_path.display()))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "agent timed out");
            return Err(anyhow!("{} timed out after {:?}", self.program, self.timeout));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent failed");
            return Err(anyhow!(
                "{} failed with status {:?} (see {})",
                self.program,
                output.status.code(),
                log_path.display()
            ));
        }

        let agent_output = read_output(&output_path)?;
        debug!(outcome = %agent_output.outcome, "parsed agent output");

        let mut new_payload = order.context.conversation();
        new_payload.push(ContextEntry::new(
            order.entry_id("message"),
            kinds::MESSAGE,
            agent_output.summary,
        ));
        Ok(ExecutorResult {
            new_payload,
            outcome: agent_output.outcome,
        })
    }

    fn profile(&self) -> ExecutorProfile {
        self.profile.clone()
    }
}

fn read_output(path: &Path) -> Result<AgentOutput> {
    if !path.exists() {
        return Err(anyhow!("missing agent output {}", path.display()));
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read agent output {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::types::Payload;

    fn order(sandbox: &Path) -> WorkOrder {
        WorkOrder {
            executor_ref: "coder".to_string(),
            context: Payload::from(vec![
                ContextEntry::new("m1", kinds::MESSAGE, "earlier"),
                ContextEntry::new("instructions:Main__Build", kinds::INSTRUCTIONS, "Build."),
                ContextEntry::new("meta:step_id", kinds::METADATA, "Main__Build"),
                ContextEntry::new("meta:iteration", kinds::METADATA, "1"),
            ]),
            sandbox_path: sandbox.to_path_buf(),
        }
    }

    /// Writes a fake agent script that answers through `--output-last-message`.
    fn fake_agent(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-agent.sh");
        let script = format!(
            "#!/bin/sh\ncat > /dev/null\nwhile [ \"$#\" -gt 0 ]; do\n  if [ \"$1\" = \"--output-last-message\" ]; then out=\"$2\"; fi\n  shift\ndone\n{body}\n"
        );
        fs::write(&path, script).expect("write script");
        let status = std::process::Command::new("chmod")
            .arg("+x")
            .arg(&path)
            .status()
            .expect("chmod");
        assert!(status.success());
        path.display().to_string()
    }

    /// The agent's outcome is returned and its summary becomes a message entry.
    #[tokio::test]
    async fn reads_outcome_and_appends_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tools");
        let mut agent = AgentExecutor::new("coder");
        agent.program = fake_agent(
            tools.path(),
            r#"printf '{"outcome":"FAILURE","summary":"tests still red"}' > "$out""#,
        );

        let result = agent.handle(order(temp.path())).await.expect("handle");

        assert_eq!(result.outcome, "FAILURE");
        let entries = result.new_payload.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "m1");
        assert_eq!(entries[1].id, "message:Main__Build:1");
        assert_eq!(entries[1].content, "tests still red");
        let scratch = temp.path().join(".graph-runner/coder");
        assert!(scratch.join("output.schema.json").is_file());
        assert!(scratch.join("Main__Build.1.log").is_file());
    }

    /// An agent that writes no output file fails the executor call.
    #[tokio::test]
    async fn missing_output_is_an_infrastructure_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tools");
        let mut agent = AgentExecutor::new("coder");
        agent.program = fake_agent(tools.path(), "true");

        let err = agent.handle(order(temp.path())).await.expect_err("missing");
        assert!(err.to_string().contains("missing agent output"));
    }

    /// A crashing agent fails the executor call.
    #[tokio::test]
    async fn non_zero_exit_is_an_infrastructure_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = tempfile::tempdir().expect("tools");
        let mut agent = AgentExecutor::new("coder");
        agent.program = fake_agent(tools.path(), "exit 7");

        let err = agent.handle(order(temp.path())).await.expect_err("failed");
        assert!(err.to_string().contains("failed with status"));
    }

    /// The output schema enumerates exactly the configured outcomes.
    #[test]
    fn schema_restricts_outcomes() {
        let agent = AgentExecutor::new("coder");
        let schema = agent.output_schema();
        assert_eq!(schema["properties"]["outcome"]["enum"], json!(["SUCCESS", "FAILURE"]));
    }
}
