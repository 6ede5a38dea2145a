//! Session event stream and status snapshots.

use std::time::Duration;

use playback_troubleshoot::{DiagnosticFinding, ResolutionStrategy};
use playback_types::{HealingStats, SessionState};

/// Outcome of executing a single recorded step.
#[derive(Clone, Debug)]
pub struct StepExecutionResult {
    /// The step's recorded step number.
    pub step_number: u64,
    /// Whether the step ultimately succeeded.
    pub success: bool,
    /// The selector that actually resolved the element. Empty iff
    /// `!success`.
    pub final_selector: String,
    /// Whether a Troubleshooter resolution was found for this step,
    /// independent of whether it was applied (see `auto_apply_healings`).
    pub healing_applied: bool,
    /// Which strategy produced the healing, when `healing_applied`.
    pub healing_strategy: Option<ResolutionStrategy>,
    /// Confidence of the healing, when `healing_applied`.
    pub healing_confidence: Option<f64>,
    /// Whether the healing was flagged for manual review (medium
    /// confidence under `flag_medium_confidence`).
    pub flagged_for_review: bool,
    /// Diagnostic findings collected while resolving this step.
    pub diagnostics: Vec<DiagnosticFinding>,
    /// Error detail, populated when `!success`.
    pub error: Option<String>,
    /// Wall-clock time spent executing this step.
    pub duration: Duration,
    /// Whether the engine suggests updating the stored recording with the
    /// healed descriptor.
    pub suggest_recording_update: bool,
}

/// Events emitted on a session's broadcast channel.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// A step is about to execute.
    StepStart {
        /// The step about to run.
        step_number: u64,
    },
    /// A step finished, successfully or not.
    StepComplete {
        /// The result of the step.
        result: StepExecutionResult,
    },
    /// A healing was found and applied mid-step.
    HealingApplied {
        /// The step it was applied to.
        step_number: u64,
        /// The strategy that produced the healing.
        strategy: ResolutionStrategy,
        /// The healed selector, when the strategy names one.
        selector: Option<String>,
        /// Confidence of the healing.
        confidence: f64,
    },
    /// The session's lifecycle status changed (paused, resumed, aborted).
    StatusChanged {
        /// The session's full state snapshot at the time of the change.
        state: SessionState,
    },
    /// The session finished running every step, or was aborted or failed.
    SessionComplete {
        /// The session's final state snapshot.
        state: SessionState,
    },
}

/// Point-in-time diagnostic snapshot across every session a
/// [`crate::PlaybackEngine`] is running.
#[derive(Clone, Copy, Debug, Default)]
pub struct EngineStatus {
    /// Number of sessions not yet completed, failed, or aborted.
    pub sessions_running: usize,
    /// Duration of the most recently completed step, across any session.
    pub last_step_duration: Option<Duration>,
    /// Aggregate healing counters across every session this engine has run.
    pub healing_stats: HealingStats,
    /// Number of healing records currently held by the pattern cache.
    pub cache_size: usize,
}
