//! Runner configuration (TOML): run limits, output locations and the executor
//! table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::transition::FALLBACK_OUTCOME;
use crate::core::types::ExecutorProfile;
use crate::io::agent::AgentExecutor;
use crate::io::command::{CommandExecutor, CommandOutcomes};
use crate::io::executor::ExecutorRegistry;
use crate::io::fs_util::write_atomic;

/// Runner configuration.
///
/// Intended to be edited by humans. Missing fields take the defaults below;
/// relative paths are resolved against the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Optional hard cap on iterations per run. Unset means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,

    /// Where the latest run snapshot is written.
    pub snapshot_path: PathBuf,

    /// Where the runtime state is persisted when a run stops.
    pub run_state_path: PathBuf,

    pub executors: BTreeMap<String, ExecutorConfig>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            snapshot_path: PathBuf::from(".graph-runner/snapshot.json"),
            run_state_path: PathBuf::from(".graph-runner/run_state.json"),
            executors: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorConfig {
    Command(CommandConfig),
    Agent(AgentConfig),
}

/// A local tool. Exit status maps to `success` / `failure` / `timeout`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Write the assembled context to the command's stdin as JSON.
    pub pass_context: bool,
    pub success: String,
    pub failure: String,
    pub timeout: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    pub settings: IndexMap<String, String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        let outcomes = CommandOutcomes::default();
        Self {
            command: Vec::new(),
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            pass_context: false,
            success: outcomes.success,
            failure: outcomes.failure,
            timeout: outcomes.timeout,
            persona: None,
            settings: IndexMap::new(),
        }
    }
}

/// An agent CLI (`codex exec` by default).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub program: String,
    pub args: Vec<String>,
    pub outcomes: Vec<String>,
    pub timeout_secs: u64,
    pub prompt_budget_bytes: usize,
    pub output_limit_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    pub settings: IndexMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            args: Vec::new(),
            outcomes: vec!["SUCCESS".to_string(), "FAILURE".to_string()],
            timeout_secs: 30 * 60,
            prompt_budget_bytes: 40_000,
            output_limit_bytes: 100_000,
            persona: None,
            settings: IndexMap::new(),
        }
    }
}

impl RunnerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == Some(0) {
            return Err(anyhow!("max_steps must be > 0 when set"));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(anyhow!("snapshot_path must not be empty"));
        }
        if self.run_state_path.as_os_str().is_empty() {
            return Err(anyhow!("run_state_path must not be empty"));
        }
        for (name, executor) in &self.executors {
            executor
                .validate()
                .with_context(|| format!("executors.{name}"))?;
        }
        Ok(())
    }

    pub fn snapshot_path_in(&self, sandbox: &Path) -> PathBuf {
        sandbox.join(&self.snapshot_path)
    }

    pub fn run_state_path_in(&self, sandbox: &Path) -> PathBuf {
        sandbox.join(&self.run_state_path)
    }
}

impl ExecutorConfig {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Command(cfg) => {
                if cfg.command.first().is_none_or(|program| program.trim().is_empty()) {
                    return Err(anyhow!("command must be a non-empty array"));
                }
                if cfg.timeout_secs == 0 {
                    return Err(anyhow!("timeout_secs must be > 0"));
                }
                if cfg.output_limit_bytes == 0 {
                    return Err(anyhow!("output_limit_bytes must be > 0"));
                }
                for outcome in [&cfg.success, &cfg.failure, &cfg.timeout] {
                    validate_outcome(outcome)?;
                }
            }
            Self::Agent(cfg) => {
                if cfg.program.trim().is_empty() {
                    return Err(anyhow!("program must not be empty"));
                }
                if cfg.outcomes.is_empty() {
                    return Err(anyhow!("outcomes must not be empty"));
                }
                if cfg.timeout_secs == 0 {
                    return Err(anyhow!("timeout_secs must be > 0"));
                }
                if cfg.prompt_budget_bytes == 0 {
                    return Err(anyhow!("prompt_budget_bytes must be > 0"));
                }
                if cfg.output_limit_bytes == 0 {
                    return Err(anyhow!("output_limit_bytes must be > 0"));
                }
                for outcome in &cfg.outcomes {
                    validate_outcome(outcome)?;
                }
            }
        }
        Ok(())
    }
}

fn validate_outcome(outcome: &str) -> Result<()> {
    if outcome.trim().is_empty() {
        return Err(anyhow!("outcome keywords must not be empty"));
    }
    if outcome == FALLBACK_OUTCOME {
        return Err(anyhow!("{FALLBACK_OUTCOME} is reserved and cannot be emitted"));
    }
    Ok(())
}

/// Build the executor registry from the `[executors]` table.
pub fn registry_from_config(cfg: &RunnerConfig) -> Result<ExecutorRegistry> {
    let mut registry = ExecutorRegistry::new();
    for (name, executor) in &cfg.executors {
        match executor {
            ExecutorConfig::Command(c) => {
                let mut handler = CommandExecutor::new(c.command.clone());
                handler.timeout = Duration::from_secs(c.timeout_secs);
                handler.output_limit_bytes = c.output_limit_bytes;
                handler.pass_context = c.pass_context;
                handler.outcomes = CommandOutcomes {
                    success: c.success.clone(),
                    failure: c.failure.clone(),
                    timeout: c.timeout.clone(),
                };
                handler.profile = ExecutorProfile {
                    persona: c.persona.clone(),
                    settings: c.settings.clone(),
                };
                registry.register(name.clone(), Arc::new(handler))?;
            }
            ExecutorConfig::Agent(a) => {
                let mut handler = AgentExecutor::new(name.clone());
                handler.program = a.program.clone();
                handler.extra_args = a.args.clone();
                handler.outcomes = a.outcomes.clone();
                handler.timeout = Duration::from_secs(a.timeout_secs);
                handler.prompt_budget_bytes = a.prompt_budget_bytes;
                handler.output_limit_bytes = a.output_limit_bytes;
                handler.profile = ExecutorProfile {
                    persona: a.persona.clone(),
                    settings: a.settings.clone(),
                };
                registry.register(name.clone(), Arc::new(handler))?;
            }
        }
    }
    debug!(executors = cfg.executors.len(), "executor registry built");
    Ok(registry)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RunnerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RunnerConfig> {
    if !path.exists() {
        let cfg = RunnerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RunnerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RunnerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}
