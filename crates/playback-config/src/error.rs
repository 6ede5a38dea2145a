//! Configuration load failures.

use std::path::PathBuf;

use thiserror::Error;

/// Failure loading a [`crate::PlaybackConfig`] from disk.
#[derive(Debug, Error)]
pub enum Error {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// The path that could not be read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The file's contents did not parse as RON.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// The path that failed to parse.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: ron::error::SpannedError,
    },
}
