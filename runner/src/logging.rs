//! Diagnostic tracing for the engine and its executors.
//!
//! Tracing goes to stderr and is never persisted. Snapshots and run state
//! (`io/sink`, `io/run_state`) are the runner's product output and are written
//! regardless of the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `-v` flags raise the level of this
/// crate's events: none keeps `warn`, one shows step progress (`info`), two or
/// more show context assembly and process details (`debug`).
///
/// ```bash
/// RUST_LOG=graph_runner::step=debug graph-runner run --manifest demos/manifest.toml --group Main --sandbox .
/// ```
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "warn,graph_runner=info",
        _ => "warn,graph_runner=debug",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Each `-v` raises only this crate's level; dependencies stay at `warn`.
    #[test]
    fn verbosity_only_raises_this_crate() {
        assert_eq!(default_directive(0), "warn");
        assert_eq!(default_directive(1), "warn,graph_runner=info");
        assert_eq!(default_directive(5), "warn,graph_runner=debug");
        for verbose in 0..3 {
            assert!(EnvFilter::try_new(default_directive(verbose)).is_ok());
        }
    }
}
