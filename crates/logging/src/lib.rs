#![warn(missing_docs)]

//! Shared logging helpers and CLI argument definitions for the playback
//! core workspace.
//!
//! Event rendering (level/target/message extraction for plain-text
//! output) lives in the separate `logfmt` crate; this one owns CLI
//! argument parsing and the `EnvFilter` spec it resolves to.

use std::env;

use clap::Args;
use tracing_subscriber::EnvFilter;

/// Crate targets included in default logging directives.
const OUR_CRATES: &[&str] = &[
    "playback_types",
    "playback_adapters",
    "playback_comparator",
    "playback_drift",
    "playback_graph",
    "playback_evidence",
    "playback_finder",
    "playback_action",
    "playback_troubleshoot",
    "playback_engine",
    "playback_store",
    "playback_delay",
    "playback_testkit",
    "playback_cli",
    "logging",
];

/// Logging controls for CLI apps.
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Set global log level to trace (our crates only)
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set global log level to debug (our crates only)
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single global log level for our crates (error|warn|info|debug|trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive (overrides other flags)
    /// e.g. "playback_engine=trace,playback_troubleshoot=debug"
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Build crate-scoped directives for the given level.
fn crate_specs(level: &str) -> Vec<String> {
    let lvl = level.to_ascii_lowercase();
    OUR_CRATES
        .iter()
        .map(|t| format!("{}={}", t, lvl))
        .collect()
}

/// Build a filter directive string that sets the same `level` for all of our crates.
pub fn level_spec_for(level: &str) -> String {
    crate_specs(level).join(",")
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `RUST_LOG` env
/// - default to crate-scoped `info`
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    if let Ok(spec) = env::var("RUST_LOG") {
        spec
    } else {
        level_spec_for("info")
    }
}

/// Create an `EnvFilter` from a spec string.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::new(spec)
}
