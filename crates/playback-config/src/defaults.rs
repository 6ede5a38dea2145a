//! The recognised-option defaults from `SPEC_FULL.md` §6, factored out so
//! [`crate::PlaybackConfig::default`] and its doc comment can't drift apart.

pub(crate) const SELF_HEALING_ENABLED: bool = true;
pub(crate) const SCREENSHOT_COMPARISON_ENABLED: bool = true;
pub(crate) const DRIFT_DETECTION_ENABLED: bool = true;
pub(crate) const GRAPH_FINDING_ENABLED: bool = true;
pub(crate) const AI_HEALING_ENABLED: bool = false;
pub(crate) const AUTO_APPLY_HEALINGS: bool = true;
pub(crate) const FLAG_MEDIUM_CONFIDENCE: bool = true;
pub(crate) const MAX_HEALING_ATTEMPTS: u32 = 3;
pub(crate) const STEP_TIMEOUT_SECS: u64 = 30;
pub(crate) const ELEMENT_TIMEOUT_SECS: u64 = 10;
pub(crate) const SCREENSHOT_THRESHOLD: f64 = 0.85;
pub(crate) const DRIFT_THRESHOLD_PX: f64 = 50.0;
pub(crate) const DEBUG_LOGGING: bool = false;
