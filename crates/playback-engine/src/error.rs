//! Construction-time failures.
//!
//! Per-step failures never throw: they fold into
//! [`crate::events::StepExecutionResult`]. The only place this crate's
//! errors surface is engine construction, where a misconfigured
//! [`playback_evidence::EvidenceWeights`] is a programmer error worth
//! rejecting up front rather than silently normalizing.

use thiserror::Error;

/// Failure constructing a [`crate::PlaybackEngine`].
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The configured evidence weights don't sum to 1.0 within tolerance.
    #[error("evidence weights sum to {0}, expected 1.0 (+/- 0.01)")]
    InvalidEvidenceWeights(f64),
}
