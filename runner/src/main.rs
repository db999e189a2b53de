//! `graph-runner`: drive a manifest graph against a sandbox directory.
//!
//! Snapshots and run state are written under the sandbox (see `RunnerConfig`).
//! Ctrl-C pauses the run after the current step; `resume` continues it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use graph_runner::core::snapshot::GraphShape;
use graph_runner::engine::{Engine, EngineOptions, RunCompletion};
use graph_runner::exit_codes;
use graph_runner::io::config::{load_config, registry_from_config};
use graph_runner::io::manifest_store::{FileManifestProvider, ManifestProvider};
use graph_runner::io::run_state::{load_run_state, write_run_state};
use graph_runner::io::sandbox::{DirectorySandbox, SandboxProvider};
use graph_runner::io::sink::{FanoutSink, JsonFileSink, TracingSink};
use graph_runner::logging;

const DEFAULT_CONFIG: &str = ".graph-runner/config.toml";

#[derive(Parser)]
#[command(
    name = "graph-runner",
    version,
    about = "Deterministic manifest-driven step graph runner"
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug). `RUST_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a fresh run at the entry step of a group.
    Run {
        #[command(flatten)]
        target: Target,
        /// Group whose entry step runs first.
        #[arg(long)]
        group: String,
    },
    /// Continue a paused run from its persisted state.
    Resume {
        #[command(flatten)]
        target: Target,
    },
    /// Print the manifest's graph shape as JSON.
    Graph {
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[derive(Args)]
struct Target {
    /// Manifest file (`.toml` or `.json`).
    #[arg(long)]
    manifest: PathBuf,
    /// Working directory handed to executors.
    #[arg(long)]
    sandbox: PathBuf,
    /// Runner config; defaults to `<sandbox>/.graph-runner/config.toml`.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::FATAL
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Graph { manifest } => cmd_graph(&manifest),
        Command::Run { target, group } => runtime()?.block_on(cmd_run(target, Some(group))),
        Command::Resume { target } => runtime()?.block_on(cmd_run(target, None)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")
}

fn cmd_graph(manifest: &Path) -> Result<i32> {
    let manifest = FileManifestProvider::new(manifest).load()?;
    let shape = GraphShape::from_manifest(&manifest);
    println!(
        "{}",
        serde_json::to_string_pretty(&shape).context("serialize graph")?
    );
    Ok(exit_codes::OK)
}

/// Run from `group`'s entry step, or resume the persisted state when `group` is `None`.
async fn cmd_run(target: Target, group: Option<String>) -> Result<i32> {
    let sandbox = DirectorySandbox::new(&target.sandbox).prepare()?;
    let manifest = Arc::new(FileManifestProvider::new(&target.manifest).load()?);
    let config_path = target
        .config
        .unwrap_or_else(|| sandbox.join(DEFAULT_CONFIG));
    let cfg = load_config(&config_path)?;
    let registry = registry_from_config(&cfg)?;
    let run_state_path = cfg.run_state_path_in(&sandbox);

    let sink = FanoutSink::new()
        .with(TracingSink)
        .with(JsonFileSink::new(cfg.snapshot_path_in(&sandbox)));
    let mut engine = Engine::new(manifest, registry, sink).with_options(EngineOptions {
        max_steps: cfg.max_steps,
        run_id: None,
    });
    if group.is_none() {
        let state = load_run_state(&run_state_path)
            .with_context(|| format!("load {}", run_state_path.display()))?;
        engine = engine.with_state(state);
    }

    let pause = engine.pause_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; pausing after the current step");
            pause.pause();
        }
    });

    let result = match &group {
        Some(group) => engine.run(group, &sandbox).await,
        None => engine.resume(&sandbox).await,
    };
    write_run_state(&run_state_path, engine.state())?;

    let run_id = engine.state().run_id.clone();
    match result.with_context(|| format!("run {run_id}"))? {
        RunCompletion::Completed { iterations } => {
            println!("{run_id}: completed after {iterations} steps");
            Ok(exit_codes::OK)
        }
        RunCompletion::Paused { at } => {
            println!(
                "{run_id}: paused before {at}; state saved to {}",
                run_state_path.display()
            );
            Ok(exit_codes::PAUSED)
        }
    }
}
