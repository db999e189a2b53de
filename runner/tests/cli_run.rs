//! CLI tests for `graph-runner`.
//!
//! Spawns the binary against a temporary sandbox with command executors and
//! checks exit codes and the files written for snapshots and run state.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use graph_runner::core::snapshot::{RunSnapshot, RunStatus};
use graph_runner::core::step_id::StepId;
use graph_runner::exit_codes;
use graph_runner::io::run_state::load_run_state;

const MANIFEST: &str = r#"
[Main]
entry_step = "Check"
static_context = { goal = "make ready.txt exist" }

[Main.steps.Check]
executor = "check"
transitions = [
  { on_outcome = "SUCCESS", action = "RETURN" },
  { on_outcome = "FAILURE", action = "CALL:Prepare" },
]

[Main.steps.Report]
executor = "check"
transitions = [{ on_outcome = "SUCCESS", action = "RETURN" }]

[Prepare]
entry_step = "Touch"

[Prepare.steps.Touch]
executor = "touch"
transitions = [{ on_outcome = "SUCCESS", action = "RETURN" }]
"#;

const CONFIG: &str = r#"
[executors.check]
kind = "command"
command = ["sh", "-c", "test -f ready.txt"]

[executors.touch]
kind = "command"
command = ["sh", "-c", "touch ready.txt"]
"#;

fn graph_runner(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_graph-runner"))
        .current_dir(cwd)
        .args(args)
        .output()
        .expect("spawn graph-runner")
}

fn setup(manifest: &str) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(temp.path().join("work/.graph-runner")).expect("mkdir");
    fs::write(temp.path().join("manifest.toml"), manifest).expect("manifest");
    fs::write(temp.path().join("work/.graph-runner/config.toml"), CONFIG).expect("config");
    temp
}

#[test]
fn run_completes_and_writes_snapshot_and_state() {
    let temp = setup(MANIFEST);

    let output = graph_runner(
        &["run", "--manifest", "manifest.toml", "--group", "Main", "--sandbox", "work"],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    assert!(temp.path().join("work/ready.txt").is_file());

    let snapshot_raw =
        fs::read_to_string(temp.path().join("work/.graph-runner/snapshot.json")).expect("snapshot");
    let snapshot: RunSnapshot = serde_json::from_str(&snapshot_raw).expect("parse snapshot");
    assert_eq!(snapshot.status, RunStatus::Completed);
    let executed: Vec<String> = snapshot.log.iter().map(|entry| entry.step.to_string()).collect();
    assert_eq!(executed, vec!["Main__Check", "Prepare__Touch", "Main__Report"]);

    let state = load_run_state(&temp.path().join("work/.graph-runner/run_state.json")).expect("state");
    assert!(state.current.is_none());
    assert_eq!(state.iterations, 3);
}

#[test]
fn unmatched_outcome_exits_fatal_with_the_error() {
    let strict = MANIFEST.replace(
        r#"{ on_outcome = "FAILURE", action = "CALL:Prepare" },"#,
        "",
    );
    let temp = setup(&strict);

    let output = graph_runner(
        &["run", "--manifest", "manifest.toml", "--group", "Main", "--sandbox", "work"],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no matching transition"), "{stderr}");
    let state = load_run_state(&temp.path().join("work/.graph-runner/run_state.json")).expect("state");
    assert_eq!(state.current, Some(StepId::new("Main", "Check")));
}

#[test]
fn resume_without_a_paused_run_is_fatal() {
    let temp = setup(MANIFEST);
    let output = graph_runner(
        &["resume", "--manifest", "manifest.toml", "--sandbox", "work"],
        temp.path(),
    );
    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
}

#[test]
fn graph_prints_the_manifest_shape() {
    let temp = setup(MANIFEST);
    let output = graph_runner(&["graph", "--manifest", "manifest.toml"], temp.path());
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let shape: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let groups = shape["groups"].as_array().expect("groups");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0]["name"], "Main");
    assert_eq!(groups[0]["steps"][0]["id"], "Main__Check");
    assert_eq!(groups[0]["steps"][1]["id"], "Main__Report");
}
