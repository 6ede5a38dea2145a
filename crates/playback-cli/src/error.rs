//! Error handling for the `playback-cli` binary.

use std::{io, result};

use thiserror::Error;

/// Convenient result type for `playback-cli` operations.
pub type Result<T> = result::Result<T, Error>;

/// Errors that can occur while running the harness.
#[derive(Debug, Error)]
pub enum Error {
    /// Wrapper for standard I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The scenario file did not parse as RON.
    #[error("failed to parse scenario file: {0}")]
    ScenarioRon(#[from] ron::error::SpannedError),
    /// The config file did not load.
    #[error("failed to load config: {0}")]
    Config(#[from] playback_config::Error),
    /// The playback engine failed to construct.
    #[error("failed to construct playback engine: {0}")]
    Engine(#[from] playback_engine::PlaybackError),
    /// The session did not complete before `--timeout` elapsed.
    #[error("session timed out after {0:?}")]
    SessionTimeout(std::time::Duration),
}
