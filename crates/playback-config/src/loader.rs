//! Load a [`crate::PlaybackConfig`] from a RON file, falling back to
//! documented defaults for any field the file omits.

use std::path::Path;

use crate::{Error, PlaybackConfig};

/// Parse `contents` as a RON-encoded, possibly-partial `PlaybackConfig`.
///
/// Fields absent from `contents` take their [`PlaybackConfig::default`]
/// value rather than failing the parse — the same "merge over defaults"
/// behavior as the file-based loader below.
pub fn parse(contents: &str) -> Result<PlaybackConfig, ron::error::SpannedError> {
    let partial: PartialPlaybackConfig = ron::from_str(contents)?;
    Ok(partial.into_config())
}

/// Load a `PlaybackConfig` from `path`. Missing files are not an error
/// condition this loader handles — callers that want an implicit default
/// for a missing file should check [`Path::exists`] first and fall back
/// to [`PlaybackConfig::default`].
pub fn load_from_path(path: &Path) -> Result<PlaybackConfig, Error> {
    let contents = std::fs::read_to_string(path).map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
    parse(&contents).map_err(|source| Error::Parse { path: path.to_path_buf(), source })
}

/// Every field optional, so a config file only needs to mention the
/// options it wants to override.
#[derive(Default, serde::Deserialize)]
#[serde(default)]
struct PartialPlaybackConfig {
    self_healing_enabled: Option<bool>,
    screenshot_comparison_enabled: Option<bool>,
    drift_detection_enabled: Option<bool>,
    graph_finding_enabled: Option<bool>,
    ai_healing_enabled: Option<bool>,
    auto_apply_healings: Option<bool>,
    flag_medium_confidence: Option<bool>,
    max_healing_attempts: Option<u32>,
    step_timeout_secs: Option<u64>,
    element_timeout_secs: Option<u64>,
    screenshot_threshold: Option<f64>,
    drift_threshold_px: Option<f64>,
    debug_logging: Option<bool>,
}

impl PartialPlaybackConfig {
    fn into_config(self) -> PlaybackConfig {
        let defaults = PlaybackConfig::default();
        PlaybackConfig {
            self_healing_enabled: self.self_healing_enabled.unwrap_or(defaults.self_healing_enabled),
            screenshot_comparison_enabled: self.screenshot_comparison_enabled.unwrap_or(defaults.screenshot_comparison_enabled),
            drift_detection_enabled: self.drift_detection_enabled.unwrap_or(defaults.drift_detection_enabled),
            graph_finding_enabled: self.graph_finding_enabled.unwrap_or(defaults.graph_finding_enabled),
            ai_healing_enabled: self.ai_healing_enabled.unwrap_or(defaults.ai_healing_enabled),
            auto_apply_healings: self.auto_apply_healings.unwrap_or(defaults.auto_apply_healings),
            flag_medium_confidence: self.flag_medium_confidence.unwrap_or(defaults.flag_medium_confidence),
            max_healing_attempts: self.max_healing_attempts.unwrap_or(defaults.max_healing_attempts),
            step_timeout_secs: self.step_timeout_secs.unwrap_or(defaults.step_timeout_secs),
            element_timeout_secs: self.element_timeout_secs.unwrap_or(defaults.element_timeout_secs),
            screenshot_threshold: self.screenshot_threshold.unwrap_or(defaults.screenshot_threshold),
            drift_threshold_px: self.drift_threshold_px.unwrap_or(defaults.drift_threshold_px),
            debug_logging: self.debug_logging.unwrap_or(defaults.debug_logging),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = parse("()").unwrap();
        assert_eq!(cfg, PlaybackConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_named_fields() {
        let cfg = parse("(ai_healing_enabled: true, max_healing_attempts: 5)").unwrap();
        assert!(cfg.ai_healing_enabled);
        assert_eq!(cfg.max_healing_attempts, 5);
        assert_eq!(cfg.screenshot_threshold, PlaybackConfig::default().screenshot_threshold);
    }

    #[test]
    fn rejects_malformed_ron() {
        assert!(parse("not valid ron {{{").is_err());
    }
}
