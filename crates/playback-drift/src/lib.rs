//! Drift Detector (C2).
//!
//! Classifies position/size drift of a recorded target given its original
//! and current bounds, and ranks candidates for a drifted replacement
//! within a search radius. See `SPEC_FULL.md` §4.2.
#![warn(missing_docs)]

use playback_adapters::ComputedStyle;
use playback_types::BoundingBox;

/// Tuning for [`detect`] and [`find_drifted_element`].
#[derive(Clone, Copy, Debug)]
pub struct DriftConfig {
    /// Center-distance threshold (px) above which position has drifted.
    pub position_tau: f64,
    /// Absolute `%` area-change threshold above which size has drifted.
    pub size_tau_pct: f64,
    /// Bounds below this area are treated as "effectively disappeared".
    pub min_visible_area: f64,
    /// Search radius (px) for [`find_drifted_element`].
    pub search_radius: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            position_tau: 50.0,
            size_tau_pct: 30.0,
            min_visible_area: 1.0,
            search_radius: 300.0,
        }
    }
}

/// Classification of the discrepancy between recorded and current bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriftKind {
    /// No meaningful drift; the element is where it was recorded.
    None,
    /// Position changed beyond tolerance, size did not.
    Position,
    /// Size changed beyond tolerance, position did not.
    Size,
    /// Both position and size changed beyond tolerance.
    Both,
    /// No current element could be found, or it is effectively invisible.
    Disappeared,
    /// A current element was found but fails identity checks outright
    /// (reserved for callers with additional DOM evidence).
    Replaced,
}

/// Compass direction of positional drift, center-to-center.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// No directional drift (distance below tolerance).
    None,
    /// Moved up.
    Up,
    /// Moved down.
    Down,
    /// Moved left.
    Left,
    /// Moved right.
    Right,
    /// Moved up and left.
    UpLeft,
    /// Moved up and right.
    UpRight,
    /// Moved down and left.
    DownLeft,
    /// Moved down and right.
    DownRight,
}

fn direction_between(from: &BoundingBox, to: &BoundingBox, tau: f64) -> Direction {
    let (fx, fy) = from.center();
    let (tx, ty) = to.center();
    let dx = tx - fx;
    let dy = ty - fy;
    if (dx * dx + dy * dy).sqrt() <= tau {
        return Direction::None;
    }
    let horiz = dx.abs() > tau * 0.25;
    let vert = dy.abs() > tau * 0.25;
    match (horiz, vert, dx > 0.0, dy > 0.0) {
        (true, true, true, true) => Direction::DownRight,
        (true, true, true, false) => Direction::UpRight,
        (true, true, false, true) => Direction::DownLeft,
        (true, true, false, false) => Direction::UpLeft,
        (true, false, true, _) => Direction::Right,
        (true, false, false, _) => Direction::Left,
        (false, true, _, true) => Direction::Down,
        (false, true, _, false) => Direction::Up,
        _ => Direction::None,
    }
}

/// How a [`Correction`] was derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CorrectionMethod {
    /// Only the bounds were corrected; the original selector still applies.
    BoundsAdjust,
    /// Both bounds and selector were corrected.
    Both,
}

/// A proposed fix for a drifted target.
#[derive(Clone, Debug)]
pub struct Correction {
    /// Corrected bounds.
    pub bounds: BoundingBox,
    /// A regenerated selector, when it differs from the original.
    pub selector: Option<String>,
    /// Which fields were corrected.
    pub method: CorrectionMethod,
}

/// Outcome of [`detect`].
#[derive(Clone, Debug)]
pub struct DriftResult {
    /// The drift classification.
    pub drift_type: DriftKind,
    /// Center-to-center distance between original and current bounds.
    pub drift_distance: f64,
    /// Direction of positional drift.
    pub direction: Direction,
    /// Signed `%` change in area, current relative to original.
    pub size_change_pct: f64,
    /// Whether the current element (if any) is still interactable.
    pub still_interactable: bool,
    /// A proposed correction, when drift was detected and correctable.
    pub correction: Option<Correction>,
    /// Confidence that this classification and correction are sound.
    pub confidence: f64,
}

/// Classify drift between a recorded target and its current counterpart.
///
/// `current` is `None` when no matching element could be found at all.
/// `regenerated_selector` is a freshly computed selector for the current
/// element, compared against `original_selector` to decide whether the
/// correction should also replace the selector.
#[must_use]
pub fn detect(
    original_bounds: &BoundingBox,
    current: Option<(&BoundingBox, ComputedStyle)>,
    original_selector: Option<&str>,
    regenerated_selector: Option<&str>,
    cfg: DriftConfig,
) -> DriftResult {
    let Some((current_bounds, style)) = current else {
        return DriftResult {
            drift_type: DriftKind::Disappeared,
            drift_distance: 0.0,
            direction: Direction::None,
            size_change_pct: 0.0,
            still_interactable: false,
            correction: None,
            confidence: 0.0,
        };
    };

    if current_bounds.area() < cfg.min_visible_area {
        return DriftResult {
            drift_type: DriftKind::Disappeared,
            drift_distance: original_bounds.center_distance(current_bounds),
            direction: Direction::None,
            size_change_pct: original_bounds.pct_area_change(current_bounds),
            still_interactable: false,
            correction: None,
            confidence: 0.0,
        };
    }

    let distance = original_bounds.center_distance(current_bounds);
    let size_change_pct = original_bounds.pct_area_change(current_bounds);
    let position_drifted = distance > cfg.position_tau;
    let size_drifted = size_change_pct.abs() > cfg.size_tau_pct;
    let still_interactable = style.is_interactable_visibility();

    let drift_type = match (position_drifted, size_drifted) {
        (false, false) => DriftKind::None,
        (true, false) => DriftKind::Position,
        (false, true) => DriftKind::Size,
        (true, true) => DriftKind::Both,
    };

    let direction = if position_drifted {
        direction_between(original_bounds, current_bounds, cfg.position_tau)
    } else {
        Direction::None
    };

    let selector_changed = match (original_selector, regenerated_selector) {
        (Some(orig), Some(new)) => orig != new,
        (None, Some(_)) => true,
        _ => false,
    };

    let correction = if matches!(drift_type, DriftKind::None) {
        None
    } else {
        Some(Correction {
            bounds: *current_bounds,
            selector: if selector_changed {
                regenerated_selector.map(str::to_string)
            } else {
                None
            },
            method: if selector_changed {
                CorrectionMethod::Both
            } else {
                CorrectionMethod::BoundsAdjust
            },
        })
    };

    // Confidence decays with distance (capped at 0.3 reduction at 200px),
    // with size-change excess beyond the threshold, and when no longer
    // interactable.
    let distance_penalty = (distance / 200.0).min(1.0) * 0.3;
    let size_excess = (size_change_pct.abs() - cfg.size_tau_pct).max(0.0);
    let size_penalty = (size_excess / 200.0).min(0.3);
    let interactable_penalty = if still_interactable { 0.0 } else { 0.4 };
    let confidence = (1.0 - distance_penalty - size_penalty - interactable_penalty).clamp(0.0, 1.0);

    DriftResult {
        drift_type,
        drift_distance: distance,
        direction,
        size_change_pct,
        still_interactable,
        correction,
        confidence,
    }
}

/// A drift-search candidate: its bounds and a text-similarity score
/// (`[0, 1]`) against the recorded target's text.
#[derive(Clone, Copy, Debug)]
pub struct DriftCandidate<'a, H> {
    /// Opaque handle back to the candidate element.
    pub handle: &'a H,
    /// The candidate's current bounds.
    pub bounds: BoundingBox,
    /// Text similarity against the recorded target, `[0, 1]`.
    pub text_similarity: f64,
}

/// Rank `candidates` by `0.6 * distance_score + 0.4 * text_similarity` and
/// return the best one within `cfg.search_radius` of `original_bounds`, if
/// any qualifies.
pub fn find_drifted_element<'a, H>(
    original_bounds: &BoundingBox,
    candidates: &'a [DriftCandidate<'a, H>],
    cfg: DriftConfig,
) -> Option<(&'a H, f64)> {
    let mut best: Option<(&H, f64)> = None;
    for candidate in candidates {
        let distance = original_bounds.center_distance(&candidate.bounds);
        if distance > cfg.search_radius {
            continue;
        }
        let distance_score = (1.0 - distance / cfg.search_radius).clamp(0.0, 1.0);
        let score = 0.6 * distance_score + 0.4 * candidate.text_similarity;
        if best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((candidate.handle, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(interactable: bool) -> ComputedStyle {
        ComputedStyle {
            displayed: interactable,
            visible: interactable,
            opaque: interactable,
            pointer_events_none: false,
            disabled: !interactable,
            hidden_input_proxy: false,
        }
    }

    #[test]
    fn detect_is_idempotent_at_original_bounds() {
        let original = BoundingBox::new(100.0, 200.0, 80.0, 30.0);
        let result = detect(&original, Some((&original, style(true))), None, None, DriftConfig::default());
        assert_eq!(result.drift_type, DriftKind::None);
        assert!(result.correction.is_none());
    }

    #[test]
    fn detect_flags_position_drift_beyond_tau() {
        let original = BoundingBox::new(100.0, 200.0, 80.0, 30.0);
        let current = BoundingBox::new(100.0, 260.0, 80.0, 30.0);
        let result = detect(&original, Some((&current, style(true))), None, None, DriftConfig::default());
        assert_eq!(result.drift_type, DriftKind::Position);
        assert!(result.correction.is_some());
    }

    #[test]
    fn detect_reports_disappeared_when_absent() {
        let original = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let result = detect(&original, None, None, None, DriftConfig::default());
        assert_eq!(result.drift_type, DriftKind::Disappeared);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn correction_includes_selector_when_regenerated_differs() {
        let original = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let current = BoundingBox::new(200.0, 200.0, 10.0, 10.0);
        let result = detect(
            &original,
            Some((&current, style(true))),
            Some("#old"),
            Some("#new"),
            DriftConfig::default(),
        );
        let correction = result.correction.expect("drift should produce a correction");
        assert_eq!(correction.method, CorrectionMethod::Both);
        assert_eq!(correction.selector.as_deref(), Some("#new"));
    }

    #[test]
    fn find_drifted_element_prefers_closer_and_more_similar() {
        let original = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let far = DriftCandidate {
            handle: &"far",
            bounds: BoundingBox::new(250.0, 250.0, 10.0, 10.0),
            text_similarity: 0.9,
        };
        let near = DriftCandidate {
            handle: &"near",
            bounds: BoundingBox::new(20.0, 20.0, 10.0, 10.0),
            text_similarity: 0.5,
        };
        let candidates = vec![far, near];
        let (best, _) = find_drifted_element(&original, &candidates, DriftConfig::default())
            .expect("a candidate should be found");
        assert_eq!(*best, "near");
    }
}
