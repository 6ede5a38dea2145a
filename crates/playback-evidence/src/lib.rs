//! Evidence Aggregator and Context Validator (C4, C5).
//!
//! Scores a pool of candidates along five weighted axes and picks the
//! best-supported one, then gates the winner against the recorded
//! surface-context hint. See `SPEC_FULL.md` §4.4, §4.5.
#![warn(missing_docs)]

use playback_adapters::Frame;
use playback_comparator::{ComparatorConfig, quick_compare};
use playback_types::{Bundle, Candidate, ContextHint, EvidenceBreakdown};

/// The five scoring weights, normalized to sum to 1.0.
///
/// Kept separate from the acceptance threshold in [`EvidenceConfig`]: the
/// weight table and the acceptance-threshold wording are tuned
/// independently.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvidenceWeights {
    /// Weight for the spatial axis.
    pub spatial: f64,
    /// Weight for the sequence axis.
    pub sequence: f64,
    /// Weight for the visual axis.
    pub visual: f64,
    /// Weight for the DOM axis.
    pub dom: f64,
    /// Weight for the history axis.
    pub history: f64,
}

impl Default for EvidenceWeights {
    fn default() -> Self {
        Self {
            spatial: 0.20,
            sequence: 0.15,
            visual: 0.25,
            dom: 0.25,
            history: 0.15,
        }
    }
}

impl EvidenceWeights {
    /// Validate that the weights sum to 1.0 within `1e-6`.
    ///
    /// # Errors
    /// Returns the out-of-tolerance sum if the weights do not add to 1.0.
    pub fn validated(self) -> Result<Self, f64> {
        let sum = self.spatial + self.sequence + self.visual + self.dom + self.history;
        if (sum - 1.0).abs() > 1e-6 {
            Err(sum)
        } else {
            Ok(self)
        }
    }
}

/// Tuning for [`find_element`].
#[derive(Clone, Copy, Debug)]
pub struct EvidenceConfig {
    /// Per-axis weights.
    pub weights: EvidenceWeights,
    /// Minimum `total_score` for a candidate to be selected.
    pub acceptance_threshold: f64,
    /// Maximum number of candidates considered.
    pub max_candidates: usize,
    /// Search radius (px) around the descriptor's recorded center.
    pub search_radius: f64,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            weights: EvidenceWeights::default(),
            acceptance_threshold: 0.6,
            max_candidates: 25,
            search_radius: 400.0,
        }
    }
}

/// Per-axis raw inputs for one candidate, gathered by the caller from its
/// `DocumentView` and the previously-matched step chain.
#[derive(Clone, Debug)]
pub struct CandidateSignals<E> {
    /// The candidate element handle.
    pub element: E,
    /// A selector string that resolves this candidate.
    pub selector: String,
    /// Center-proximity + overlap with recorded bounds, `[0, 1]`.
    pub spatial: f64,
    /// Plausibility relative to previously-matched elements, `[0, 1]`.
    pub sequence: f64,
    /// The candidate's captured viewport region, for the visual axis.
    pub capture: Option<Frame>,
    /// Identity-attribute agreement score (id/testId/name/aria/role/class
    /// tokens and tag), `[0, 1]`.
    pub dom: f64,
    /// Prior healing success for candidates with compatible fingerprints,
    /// `[0, 1]`.
    pub history: f64,
}

/// Outcome of [`find_element`].
#[derive(Clone, Debug)]
pub struct EvidenceResult<E> {
    /// Whether a candidate cleared the acceptance threshold.
    pub success: bool,
    /// The winning candidate, when successful.
    pub selected: Option<Candidate<E>>,
    /// Confidence of the winning candidate (its `total_score`).
    pub confidence: f64,
    /// Human-readable strings describing which axes drove the decision.
    pub reasoning: Vec<String>,
}

fn reasoning_for(evidence: &EvidenceBreakdown, weights: &EvidenceWeights) -> Vec<String> {
    let mut contributions = vec![
        ("spatial", evidence.spatial * weights.spatial),
        ("sequence", evidence.sequence * weights.sequence),
        ("visual", evidence.visual * weights.visual),
        ("dom", evidence.dom * weights.dom),
        ("history", evidence.history * weights.history),
    ];
    contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
    contributions
        .into_iter()
        .filter(|(_, weighted)| *weighted > 0.0)
        .map(|(axis, weighted)| format!("{axis} contributed {weighted:.3}"))
        .collect()
}

/// Score `candidates` and select the best-supported one.
///
/// `recorded_capture` is the descriptor's recorded screenshot region, used
/// for the visual axis via [`quick_compare`].
#[must_use]
pub fn find_element<E: Clone>(
    candidates: Vec<CandidateSignals<E>>,
    recorded_capture: Option<&Frame>,
    cfg: EvidenceConfig,
) -> EvidenceResult<E> {
    let comparator_cfg = ComparatorConfig::default();
    let mut scored: Vec<Candidate<E>> = candidates
        .into_iter()
        .take(cfg.max_candidates)
        .map(|signals| {
            let visual = quick_compare(recorded_capture, signals.capture.as_ref(), comparator_cfg).similarity;
            let evidence = EvidenceBreakdown {
                spatial: signals.spatial.clamp(0.0, 1.0),
                sequence: signals.sequence.clamp(0.0, 1.0),
                visual: visual.clamp(0.0, 1.0),
                dom: signals.dom.clamp(0.0, 1.0),
                history: signals.history.clamp(0.0, 1.0),
            };
            let total_score = evidence.spatial * cfg.weights.spatial
                + evidence.sequence * cfg.weights.sequence
                + evidence.visual * cfg.weights.visual
                + evidence.dom * cfg.weights.dom
                + evidence.history * cfg.weights.history;
            Candidate {
                element: signals.element,
                selector: signals.selector,
                evidence,
                total_score,
            }
        })
        .collect();

    // Ties break on the DOM axis, then Visual.
    scored.sort_by(|a, b| {
        b.total_score
            .total_cmp(&a.total_score)
            .then_with(|| b.evidence.dom.total_cmp(&a.evidence.dom))
            .then_with(|| b.evidence.visual.total_cmp(&a.evidence.visual))
    });

    match scored.into_iter().next() {
        Some(winner) if winner.total_score >= cfg.acceptance_threshold => {
            let reasoning = reasoning_for(&winner.evidence, &cfg.weights);
            EvidenceResult {
                success: true,
                confidence: winner.total_score,
                selected: Some(winner),
                reasoning,
            }
        }
        Some(runner_up) => EvidenceResult {
            success: false,
            confidence: runner_up.total_score,
            selected: None,
            reasoning: vec!["best candidate below acceptance threshold".to_string()],
        },
        None => EvidenceResult {
            success: false,
            confidence: 0.0,
            selected: None,
            reasoning: vec!["no candidates within search radius".to_string()],
        },
    }
}

/// Surface kind inferred for a candidate or expected from a descriptor,
/// used by [`validate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Surface {
    /// A terminal / command surface.
    Terminal,
    /// A rich-text editing surface.
    RichText,
    /// A chat input surface.
    Chat,
    /// No specific surface semantics.
    Generic,
}

impl From<ContextHint> for Surface {
    fn from(hint: ContextHint) -> Self {
        match hint {
            ContextHint::Terminal => Surface::Terminal,
            ContextHint::RichTextSurface => Surface::RichText,
            ContextHint::ChatSurface => Surface::Chat,
            ContextHint::Generic => Surface::Generic,
        }
    }
}

/// Infer a [`Surface`] from class tokens / an xpath string, for candidates
/// that carry no explicit `ContextHint`.
#[must_use]
pub fn infer_surface(class_tokens: &[String], xpath: Option<&str>) -> Surface {
    let haystack = class_tokens.join(" ").to_lowercase();
    let xpath = xpath.unwrap_or_default().to_lowercase();
    if haystack.contains("terminal") || xpath.contains("terminal") {
        Surface::Terminal
    } else if haystack.contains("chat") || xpath.contains("chat") {
        Surface::Chat
    } else if haystack.contains("rich-text") || haystack.contains("richtext") || xpath.contains("contenteditable") {
        Surface::RichText
    } else {
        Surface::Generic
    }
}

/// Outcome of [`validate`].
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationResult {
    /// The surface expected by the descriptor.
    pub expected: Surface,
    /// The surface inferred for the candidate.
    pub actual: Surface,
    /// Whether the candidate's surface is acceptable.
    pub is_valid: bool,
    /// Explanation, present when rejected.
    pub reason: Option<String>,
}

/// Validate that a candidate's inferred surface agrees with the
/// descriptor's expected surface.
///
/// Rules: exact match is valid; `Generic` expected matches anything; a
/// `Chat` candidate is allowed to satisfy an expected `RichText` surface
/// (chat inputs are commonly implemented atop a rich-text editor); any
/// other mismatch involving `Terminal` on either side is a hard reject.
#[must_use]
pub fn validate(expected: Surface, actual: Surface) -> ValidationResult {
    let is_valid = expected == actual
        || expected == Surface::Generic
        || (expected == Surface::RichText && actual == Surface::Chat);

    let reason = if is_valid {
        None
    } else if expected == Surface::Terminal || actual == Surface::Terminal {
        Some("terminal surface mismatch: refusing to route input across the command boundary".to_string())
    } else {
        Some(format!("expected {expected:?} surface, found {actual:?}"))
    };

    ValidationResult {
        expected,
        actual,
        is_valid,
        reason,
    }
}

/// Convenience wrapper deriving `expected` from a [`Bundle`]'s
/// `context_hint`, falling back to class/xpath inference when absent.
#[must_use]
pub fn validate_descriptor(descriptor: &Bundle, candidate_class_tokens: &[String], candidate_xpath: Option<&str>) -> ValidationResult {
    let expected = Surface::from(descriptor.context_hint);
    let actual = infer_surface(candidate_class_tokens, candidate_xpath);
    validate(expected, actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_default_sum_to_one() {
        assert!(EvidenceWeights::default().validated().is_ok());
    }

    #[test]
    fn weights_reject_bad_sum() {
        let bad = EvidenceWeights {
            spatial: 0.5,
            ..EvidenceWeights::default()
        };
        assert!(bad.validated().is_err());
    }

    fn signals(dom: f64, spatial: f64) -> CandidateSignals<u32> {
        CandidateSignals {
            element: 1,
            selector: "#a".into(),
            spatial,
            sequence: 0.5,
            capture: None,
            dom,
            history: 0.0,
        }
    }

    #[test]
    fn find_element_selects_best_above_threshold() {
        let candidates = vec![signals(0.9, 0.9), signals(0.1, 0.1)];
        let result = find_element(candidates, None, EvidenceConfig::default());
        assert!(result.success);
        assert!(result.selected.is_some());
        assert!(!result.reasoning.is_empty());
    }

    #[test]
    fn find_element_rejects_when_below_threshold() {
        let candidates = vec![signals(0.1, 0.1)];
        let result = find_element(candidates, None, EvidenceConfig::default());
        assert!(!result.success);
        assert!(result.selected.is_none());
    }

    #[test]
    fn find_element_handles_empty_pool() {
        let result = find_element::<u32>(Vec::new(), None, EvidenceConfig::default());
        assert!(!result.success);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn context_validator_allows_chat_on_rich_text() {
        let result = validate(Surface::RichText, Surface::Chat);
        assert!(result.is_valid);
    }

    #[test]
    fn context_validator_hard_rejects_terminal_mismatch() {
        let result = validate(Surface::Terminal, Surface::Chat);
        assert!(!result.is_valid);
        assert!(result.reason.unwrap().contains("terminal"));
    }

    #[test]
    fn context_validator_generic_matches_anything() {
        assert!(validate(Surface::Generic, Surface::Terminal).is_valid);
    }
}
