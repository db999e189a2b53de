//! Helpers for running executor processes with timeouts and bounded output.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// A process invocation on behalf of an executor handler.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    /// Bytes of stdout/stderr kept in memory; the rest is drained and counted.
    pub output_limit_bytes: usize,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    /// Stdout and stderr rendered as one log text with truncation notices.
    pub fn render_log(&self) -> String {
        let mut buf = String::new();
        buf.push_str("=== stdout ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stdout));
        if self.stdout_truncated > 0 {
            buf.push_str(&format!(
                "\n[stdout truncated {} bytes]\n",
                self.stdout_truncated
            ));
        }
        buf.push_str("\n=== stderr ===\n");
        buf.push_str(&String::from_utf8_lossy(&self.stderr));
        if self.stderr_truncated > 0 {
            buf.push_str(&format!(
                "\n[stderr truncated {} bytes]\n",
                self.stderr_truncated
            ));
        }
        if self.timed_out {
            buf.push_str("\n[timed out]\n");
        }
        buf
    }
}

/// Run `request` on the blocking pool so the engine's task is not stalled.
pub async fn run_command(request: CommandRequest) -> Result<CommandOutput> {
    tokio::task::spawn_blocking(move || run_command_blocking(&request))
        .await
        .context("join command task")?
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs.
#[instrument(skip_all, fields(program = request.argv.first().map(String::as_str), timeout_secs = request.timeout.as_secs()))]
pub fn run_command_blocking(request: &CommandRequest) -> Result<CommandOutput> {
    let (program, args) = request
        .argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(&request.workdir);
    if request.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!(workdir = %request.workdir.display(), "spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {program}"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = request.output_limit_bytes;
    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, limit));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, limit));

    if let Some(input) = &request.stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // A child that exits without reading stdin closes the pipe; that is not our failure.
        if let Err(e) = child_stdin.write_all(input) {
            warn!(err = %e, "child closed stdin early");
        }
    }

    let mut timed_out = false;
    let status = match child
        .wait_timeout(request.timeout)
        .context("wait for command")?
    {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = request.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, workdir: PathBuf) -> CommandRequest {
        CommandRequest {
            argv: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            workdir,
            stdin: None,
            timeout: Duration::from_secs(10),
            output_limit_bytes: 1024,
        }
    }

    /// Exit code, stdout and stderr are all captured.
    #[test]
    fn captures_exit_status_and_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_command_blocking(&sh("echo hi; echo err >&2; exit 3", temp.path().into()))
            .expect("run");
        assert!(!output.success());
        assert_eq!(output.status.code(), Some(3));
        let log = output.render_log();
        assert!(log.contains("hi"));
        assert!(log.contains("err"));
    }

    /// Request stdin is written to the child.
    #[test]
    fn forwards_stdin() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut request = sh("cat", temp.path().into());
        request.stdin = Some(b"payload".to_vec());
        let output = run_command_blocking(&request).expect("run");
        assert!(output.success());
        assert_eq!(output.stdout, b"payload");
    }

    /// Output past `output_limit_bytes` is cut and the dropped byte count recorded.
    #[test]
    fn truncates_beyond_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut request = sh("printf 'abcdefghij'", temp.path().into());
        request.output_limit_bytes = 4;
        let output = run_command_blocking(&request).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    /// A child that outlives its timeout is killed and reported as timed out.
    #[test]
    fn kills_on_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut request = sh("sleep 5", temp.path().into());
        request.timeout = Duration::from_millis(100);
        let output = run_command_blocking(&request).expect("run");
        assert!(output.timed_out);
        assert!(!output.success());
    }
}
