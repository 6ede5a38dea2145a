//! Tuning for [`crate::PlaybackEngine`], covering every configuration
//! option the playback core recognizes (`SPEC_FULL.md` §6).

use std::time::Duration;

use playback_action::ActionConfig;
use playback_delay::DelayConfig;
use playback_evidence::EvidenceConfig;

/// Engine-wide configuration, shared by every session a [`crate::PlaybackEngine`]
/// runs unless a future caller threads per-session overrides through.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Whether the Troubleshooter is consulted at all on a find failure.
    pub self_healing_enabled: bool,
    /// Whether the Screenshot Comparator gates a found element before it's
    /// accepted.
    pub screenshot_comparison_enabled: bool,
    /// Whether the Troubleshooter's drift-correction strategy may run.
    pub drift_detection_enabled: bool,
    /// Whether graph-based candidate seeding and graph-navigation healing
    /// are attempted.
    pub graph_finding_enabled: bool,
    /// Whether the remote AI vision healing provider is consulted.
    pub ai_healing_enabled: bool,
    /// Whether an accepted healing is applied automatically. When false,
    /// a found healing is reported but the step is left for manual
    /// confirmation rather than acted on.
    pub auto_apply_healings: bool,
    /// Whether healings below 0.9 confidence are flagged for review even
    /// when applied.
    pub flag_medium_confidence: bool,
    /// Cap on healing attempts per step before giving up. Reserved for a
    /// future retry loop around [`playback_troubleshoot::troubleshoot`];
    /// the current engine makes a single attempt per step.
    pub max_healing_attempts: u32,
    /// Wall-clock budget for a whole step, healing included.
    pub step_timeout: Duration,
    /// Wall-clock budget for the initial Element Finder poll.
    pub element_timeout: Duration,
    /// Screenshot Comparator match threshold.
    pub screenshot_threshold: f64,
    /// Drift Detector position-drift threshold, in pixels.
    pub drift_threshold: f64,
    /// Whether verbose per-step diagnostics are logged.
    pub debug_logging: bool,
    /// Whether a failed step aborts the remainder of the session.
    pub stop_on_error: bool,
    /// Candidate-gathering search radius, in pixels.
    pub candidate_search_radius: f64,
    /// Per-call timeout for either vision healing provider.
    pub healing_provider_timeout: Duration,
    /// Delay Manager tuning.
    pub delay: DelayConfig,
    /// Action Executor tuning.
    pub action: ActionConfig,
    /// Evidence Scorer weights and acceptance threshold. Validated at
    /// [`crate::PlaybackEngine::new`] construction time.
    pub evidence: EvidenceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            self_healing_enabled: true,
            screenshot_comparison_enabled: true,
            drift_detection_enabled: true,
            graph_finding_enabled: true,
            ai_healing_enabled: false,
            auto_apply_healings: true,
            flag_medium_confidence: true,
            max_healing_attempts: 3,
            step_timeout: Duration::from_secs(30),
            element_timeout: Duration::from_secs(10),
            screenshot_threshold: 0.85,
            drift_threshold: 50.0,
            debug_logging: false,
            stop_on_error: false,
            candidate_search_radius: 400.0,
            healing_provider_timeout: Duration::from_secs(10),
            delay: DelayConfig::default(),
            action: ActionConfig::default(),
            evidence: EvidenceConfig::default(),
        }
    }
}
