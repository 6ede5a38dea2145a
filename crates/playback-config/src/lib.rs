//! Serializable, file-loadable configuration for the self-healing
//! playback core.
//!
//! [`playback_engine::EngineConfig`] is the engine's in-memory tuning
//! struct and includes per-component knobs (Delay Manager, Action
//! Executor, Evidence Aggregator weights) that `SPEC_FULL.md` §6 does not
//! enumerate as "recognised configuration options" a caller sets from an
//! external file. This crate owns exactly that recognised surface as a
//! flat, `serde`-deserializable [`PlaybackConfig`], RON-encoded on disk,
//! merged field-by-field over documented defaults via a partial RON
//! document merged over a `Config::default()`. [`PlaybackConfig::into_engine_config`]
//! folds it into a full `EngineConfig`, leaving every field §6 doesn't
//! mention at its `EngineConfig::default()` value.
#![warn(missing_docs)]

mod defaults;
mod error;
mod loader;

use std::time::Duration;

use playback_engine::EngineConfig;
use serde::{Deserialize, Serialize};

pub use error::Error;
pub use loader::{load_from_path, parse};

/// The playback core's externally-configurable options (`SPEC_FULL.md`
/// §6), independent of the engine's internal per-component tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Whether the Troubleshooter is consulted at all on a find failure.
    pub self_healing_enabled: bool,
    /// Whether the Screenshot Comparator gates a found element before
    /// it's accepted.
    pub screenshot_comparison_enabled: bool,
    /// Whether the Troubleshooter's drift-correction strategy may run.
    pub drift_detection_enabled: bool,
    /// Whether graph-based candidate seeding and graph-navigation
    /// healing are attempted.
    pub graph_finding_enabled: bool,
    /// Whether the remote AI vision healing provider is consulted.
    pub ai_healing_enabled: bool,
    /// Whether an accepted healing is applied automatically.
    pub auto_apply_healings: bool,
    /// Whether healings below 0.9 confidence are flagged for review even
    /// when applied.
    pub flag_medium_confidence: bool,
    /// Cap on healing attempts per step before giving up.
    pub max_healing_attempts: u32,
    /// Wall-clock budget for a whole step, healing included, in seconds.
    pub step_timeout_secs: u64,
    /// Wall-clock budget for the initial Element Finder poll, in seconds.
    pub element_timeout_secs: u64,
    /// Screenshot Comparator match threshold.
    pub screenshot_threshold: f64,
    /// Drift Detector position-drift threshold, in pixels.
    pub drift_threshold_px: f64,
    /// Whether verbose per-step diagnostics are logged.
    pub debug_logging: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            self_healing_enabled: defaults::SELF_HEALING_ENABLED,
            screenshot_comparison_enabled: defaults::SCREENSHOT_COMPARISON_ENABLED,
            drift_detection_enabled: defaults::DRIFT_DETECTION_ENABLED,
            graph_finding_enabled: defaults::GRAPH_FINDING_ENABLED,
            ai_healing_enabled: defaults::AI_HEALING_ENABLED,
            auto_apply_healings: defaults::AUTO_APPLY_HEALINGS,
            flag_medium_confidence: defaults::FLAG_MEDIUM_CONFIDENCE,
            max_healing_attempts: defaults::MAX_HEALING_ATTEMPTS,
            step_timeout_secs: defaults::STEP_TIMEOUT_SECS,
            element_timeout_secs: defaults::ELEMENT_TIMEOUT_SECS,
            screenshot_threshold: defaults::SCREENSHOT_THRESHOLD,
            drift_threshold_px: defaults::DRIFT_THRESHOLD_PX,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }
}

impl PlaybackConfig {
    /// Fold these recognised options into a full [`EngineConfig`], taking
    /// every other tuning knob (delay, action, evidence weights, search
    /// radius, healing-provider timeout, `stop_on_error`) from
    /// `EngineConfig::default()`.
    #[must_use]
    pub fn into_engine_config(self) -> EngineConfig {
        EngineConfig {
            self_healing_enabled: self.self_healing_enabled,
            screenshot_comparison_enabled: self.screenshot_comparison_enabled,
            drift_detection_enabled: self.drift_detection_enabled,
            graph_finding_enabled: self.graph_finding_enabled,
            ai_healing_enabled: self.ai_healing_enabled,
            auto_apply_healings: self.auto_apply_healings,
            flag_medium_confidence: self.flag_medium_confidence,
            max_healing_attempts: self.max_healing_attempts,
            step_timeout: Duration::from_secs(self.step_timeout_secs),
            element_timeout: Duration::from_secs(self.element_timeout_secs),
            screenshot_threshold: self.screenshot_threshold,
            drift_threshold: self.drift_threshold_px,
            debug_logging: self.debug_logging,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let cfg = PlaybackConfig::default();
        assert_eq!(cfg.screenshot_threshold, 0.85);
        assert_eq!(cfg.drift_threshold_px, 50.0);
        assert_eq!(cfg.element_timeout_secs, 10);
        assert_eq!(cfg.step_timeout_secs, 30);
        assert_eq!(cfg.max_healing_attempts, 3);
    }

    #[test]
    fn into_engine_config_carries_recognised_fields_and_defaults_the_rest() {
        let mut cfg = PlaybackConfig::default();
        cfg.screenshot_threshold = 0.5;
        cfg.ai_healing_enabled = true;
        let engine = cfg.into_engine_config();
        assert_eq!(engine.screenshot_threshold, 0.5);
        assert!(engine.ai_healing_enabled);
        assert_eq!(engine.evidence.acceptance_threshold, EngineConfig::default().evidence.acceptance_threshold);
    }
}
