#![warn(missing_docs)]

//! Entry point for the `playback-cli` binary: a smoke-test harness that
//! replays a recorded-step scenario through the playback core's synthetic
//! document and prints a per-step report.

mod cli;
mod error;
mod run;
mod scenario;
mod store;

use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, registry};

use crate::{
    cli::{Cli, Commands},
    error::Result,
};

fn main() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start tokio runtime");
    if let Err(err) = runtime.block_on(run()) {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen subcommand.
async fn run() -> Result<()> {
    let Cli { log, command } = Cli::parse();
    let log_spec = logging::compute_spec(log.trace, log.debug, log.log_level.as_deref(), log.log_filter.as_deref());
    let env_filter = logging::env_filter_from_spec(&log_spec);
    registry().with(env_filter).with(fmt::layer().without_time()).try_init().ok();

    match command {
        Commands::Run(args) => run::run(&args).await,
    }
}
