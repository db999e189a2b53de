//! State sinks: where the engine publishes run snapshots.
//!
//! The engine calls [`StateSink::publish`] once per iteration and once when the
//! run stops. Sinks must not fail the run; write errors are logged and dropped.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::core::snapshot::RunSnapshot;
use crate::io::fs_util::write_atomic;

pub trait StateSink: Send + Sync {
    fn publish(&self, snapshot: &RunSnapshot);
}

impl<F> StateSink for F
where
    F: Fn(&RunSnapshot) + Send + Sync,
{
    fn publish(&self, snapshot: &RunSnapshot) {
        self(snapshot);
    }
}

/// Discards snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl StateSink for NullSink {
    fn publish(&self, _snapshot: &RunSnapshot) {}
}

/// Emits one `info` event per snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StateSink for TracingSink {
    fn publish(&self, snapshot: &RunSnapshot) {
        info!(
            run_id = %snapshot.run_id,
            status = ?snapshot.status,
            iterations = snapshot.iterations,
            current = ?snapshot.current.as_ref().map(ToString::to_string),
            call_depth = snapshot.call_stack.len(),
            "run snapshot"
        );
    }
}

/// Keeps the latest snapshot as pretty JSON on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateSink for JsonFileSink {
    fn publish(&self, snapshot: &RunSnapshot) {
        let buf = match serde_json::to_string_pretty(snapshot) {
            Ok(mut buf) => {
                buf.push('\n');
                buf
            }
            Err(err) => {
                warn!(err = %err, "failed to serialize snapshot");
                return;
            }
        };
        if let Err(err) = write_atomic(&self.path, &buf) {
            warn!(path = %self.path.display(), err = %format!("{err:#}"), "failed to write snapshot");
        }
    }
}

/// Forwards every snapshot to each inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn StateSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl StateSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl StateSink for FanoutSink {
    fn publish(&self, snapshot: &RunSnapshot) {
        for sink in &self.sinks {
            sink.publish(snapshot);
        }
    }
}
