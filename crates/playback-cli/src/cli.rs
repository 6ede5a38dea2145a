//! Command-line interface definitions for `playback-cli`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;

/// Command-line interface for the `playback-cli` binary.
#[derive(Parser, Debug)]
#[command(
    name = "playback-cli",
    about = "Replay a recorded scenario through the self-healing playback core",
    version
)]
pub struct Cli {
    /// Logging controls shared across the workspace's binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Which harness command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level harness commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a RON-encoded scenario and print a per-step report.
    Run(RunArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to a RON-encoded scenario (starting elements plus recorded steps).
    #[arg(value_name = "SCENARIO")]
    pub scenario: PathBuf,

    /// Optional path to a RON-encoded `PlaybackConfig` overriding defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Optional path to a JSON healing-pattern cache file, created if absent
    /// and rewritten as steps heal.
    #[arg(long, value_name = "PATH")]
    pub pattern_store: Option<PathBuf>,

    /// Maximum wall-clock seconds to wait for the whole session to finish.
    #[arg(long, default_value_t = 120)]
    pub timeout_secs: u64,
}
