//! Delay Manager (C11).
//!
//! Computes the effective pre-step delay and executes it as a cancellable
//! wait. See `SPEC_FULL.md` §4.9.
#![warn(missing_docs)]

use std::time::Duration;

use playback_types::RecordedStep;
use tokio_util::sync::CancellationToken;

/// Which source determined the effective delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayKind {
    /// The session-wide default delay.
    Global,
    /// The step's own `delayMs` override.
    Step,
    /// A value computed from runtime context (e.g. fast-mode scaling).
    Dynamic,
    /// No delay applies.
    None,
}

/// Tuning for [`calculate`].
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct DelayConfig {
    /// Session-wide default delay, in milliseconds.
    pub global_delay_ms: u64,
    /// Floor applied to the effective delay.
    pub minimum_delay_ms: u64,
    /// Ceiling applied to the effective delay.
    pub maximum_delay_ms: u64,
    /// Multiplier in `(0, 1]` applied when fast mode is active.
    pub fast_mode_multiplier: f64,
    /// Whether fast mode is currently active.
    pub fast_mode: bool,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            global_delay_ms: 500,
            minimum_delay_ms: 0,
            maximum_delay_ms: 10_000,
            fast_mode_multiplier: 1.0,
            fast_mode: false,
        }
    }
}

/// Outcome of [`calculate`].
#[derive(Clone, Debug, PartialEq)]
pub struct DelayDecision {
    /// The effective delay to wait, in milliseconds, after bounding/scaling.
    pub delay_ms: u64,
    /// Which source determined the delay before bounding/scaling.
    pub kind: DelayKind,
    /// Whether bounding or fast-mode scaling changed the value.
    pub modified: bool,
    /// The delay before bounding/scaling was applied.
    pub original_delay_ms: u64,
    /// Explanation, populated when `modified`.
    pub reason: Option<String>,
}

/// Compute the effective delay for `step` under `cfg`: the step's own
/// override if present, else the global default; then bounded to
/// `[minimum_delay_ms, maximum_delay_ms]` and scaled by
/// `fast_mode_multiplier` when fast mode is active.
#[must_use]
pub fn calculate(step: &RecordedStep, cfg: DelayConfig) -> DelayDecision {
    let (original_delay_ms, kind) = match step.delay_ms {
        Some(ms) => (ms, DelayKind::Step),
        None if cfg.global_delay_ms > 0 => (cfg.global_delay_ms, DelayKind::Global),
        None => (0, DelayKind::None),
    };

    let mut effective = original_delay_ms as f64;
    let mut reason = None;

    if cfg.fast_mode && cfg.fast_mode_multiplier < 1.0 {
        effective *= cfg.fast_mode_multiplier.max(0.0);
        reason = Some("scaled by fast-mode multiplier".to_string());
    }

    let bounded = effective.round() as u64;
    let bounded = bounded.clamp(cfg.minimum_delay_ms, cfg.maximum_delay_ms);
    let modified = bounded != original_delay_ms;
    if modified && reason.is_none() {
        reason = Some("bounded to configured delay range".to_string());
    }

    DelayDecision {
        delay_ms: bounded,
        kind,
        modified,
        original_delay_ms,
        reason,
    }
}

/// Outcome of [`execute`]: whether the wait elapsed naturally or was cut
/// short.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelayOutcome {
    /// The full delay elapsed.
    Elapsed,
    /// `skip_current_delay()` (or cancellation) resolved the wait early.
    Skipped,
}

/// Execute a delay, resolving early if `cancellation` is triggered before
/// `delay_ms` elapses. When `skippable` is false, cancellation only takes
/// effect at the session's `abort()` boundary — callers enforce that by
/// passing a token that is only ever triggered on abort for non-skippable
/// delays.
pub async fn execute(delay_ms: u64, cancellation: &CancellationToken) -> DelayOutcome {
    if delay_ms == 0 {
        return DelayOutcome::Elapsed;
    }
    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(delay_ms)) => DelayOutcome::Elapsed,
        () = cancellation.cancelled() => DelayOutcome::Skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_types::{Bundle, BoundingBox, ContextHint, ElementGraph, ElementNode, EventKind, RelationshipTag};

    fn descriptor() -> Bundle {
        let bounds = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        Bundle {
            primary_selector: Some("#a".into()),
            id: None,
            name: None,
            test_id: None,
            aria_label: None,
            role: None,
            placeholder: None,
            xpath: None,
            tag_name: "button".into(),
            text: None,
            class_tokens: Vec::new(),
            original_bounds: bounds,
            context_hint: ContextHint::Generic,
            in_terminal: false,
            in_rich_text: false,
            in_chat: false,
            graph: ElementGraph {
                target: ElementNode {
                    relationship: RelationshipTag::Target,
                    tag_name: "button".into(),
                    id: None,
                    class_name: Vec::new(),
                    name: None,
                    aria_label: None,
                    role: None,
                    test_id: None,
                    bounds,
                    selector: "#a".into(),
                    text: None,
                    is_stable: true,
                    distance_to_target: None,
                },
                parents: Vec::new(),
                siblings: Vec::new(),
                children: Vec::new(),
                nearby: Vec::new(),
                landmarks: Vec::new(),
            },
            recorded_screenshot: None,
            recorded_screenshot_bounds: None,
            recorded_visual_context_confidence: None,
        }
    }

    fn step(delay_ms: Option<u64>) -> RecordedStep {
        RecordedStep {
            step_number: 1,
            event_kind: EventKind::Click,
            value: None,
            descriptor: descriptor(),
            recorded_screenshot: None,
            delay_ms,
            conditional: None,
        }
    }

    #[test]
    fn step_override_wins_over_global_default() {
        let decision = calculate(&step(Some(1200)), DelayConfig::default());
        assert_eq!(decision.kind, DelayKind::Step);
        assert_eq!(decision.delay_ms, 1200);
    }

    #[test]
    fn falls_back_to_global_default() {
        let decision = calculate(&step(None), DelayConfig::default());
        assert_eq!(decision.kind, DelayKind::Global);
        assert_eq!(decision.delay_ms, 500);
    }

    #[test]
    fn bounds_clamp_an_excessive_delay() {
        let cfg = DelayConfig { maximum_delay_ms: 1000, ..DelayConfig::default() };
        let decision = calculate(&step(Some(5000)), cfg);
        assert_eq!(decision.delay_ms, 1000);
        assert!(decision.modified);
    }

    #[test]
    fn fast_mode_scales_the_delay() {
        let cfg = DelayConfig { fast_mode: true, fast_mode_multiplier: 0.5, ..DelayConfig::default() };
        let decision = calculate(&step(Some(1000)), cfg);
        assert_eq!(decision.delay_ms, 500);
        assert!(decision.modified);
    }

    #[tokio::test]
    async fn execute_resolves_early_on_cancellation() {
        let token = CancellationToken::new();
        let token_clone = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            token_clone.cancel();
        });
        let outcome = execute(5_000, &token).await;
        assert_eq!(outcome, DelayOutcome::Skipped);
    }

    #[tokio::test]
    async fn execute_elapses_naturally_without_cancellation() {
        let token = CancellationToken::new();
        let outcome = execute(5, &token).await;
        assert_eq!(outcome, DelayOutcome::Elapsed);
    }
}
