//! Troubleshooter (C8).
//!
//! Runs the fixed-priority diagnostic suite, then the ordered resolution
//! strategies, stopping at the first success. See `SPEC_FULL.md` §4.8.
#![warn(missing_docs)]

use std::time::Duration;

use playback_adapters::{ComputedStyle, DocumentView, Frame, HealingProvider, ReadyState};
use playback_comparator::CompareResult;
use playback_drift::{self, DriftCandidate, DriftConfig, DriftKind, DriftResult};
use playback_evidence::{CandidateSignals, EvidenceConfig, find_element};
use playback_graph::{self, GraphFindResult, LiveNode};
use playback_types::{Bundle, HealingRecord, RecordedStep};
use tokio_util::sync::CancellationToken;

/// Which fixed-priority check a [`DiagnosticFinding`] reports on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticId {
    /// Document `readyState` is complete.
    PageLoaded,
    /// The primary selector resolves to a node.
    ElementExists,
    /// Computed styles and rect indicate visibility.
    ElementVisible,
    /// Not disabled, `pointer-events` not `none`.
    ElementInteractable,
    /// Screenshot Comparator reports a match.
    ScreenshotMatch,
    /// Drift Detector returns [`DriftKind::None`].
    DriftCheck,
    /// Recorded visual-context confidence is at least 0.7.
    ContextMatch,
    /// At least half of recorded landmarks/ancestors are re-resolvable.
    GraphIntegrity,
    /// The recorded selector is syntactically well-formed.
    SelectorValid,
    /// The iframe boundary (if any) is traversable.
    IframeAccessible,
    /// The shadow-root boundary (if any) is traversable.
    ShadowAccessible,
}

/// The outcome of a single diagnostic check.
#[derive(Clone, Debug)]
pub struct DiagnosticFinding {
    /// Which check this is.
    pub id: DiagnosticId,
    /// Whether the check passed.
    pub passed: bool,
    /// Explanatory detail, mainly populated on failure.
    pub detail: Option<String>,
}

fn finding(id: DiagnosticId, passed: bool, detail: impl Into<Option<String>>) -> DiagnosticFinding {
    DiagnosticFinding { id, passed, detail: detail.into() }
}

fn selector_is_valid(selector: &str) -> bool {
    let trimmed = selector.trim();
    !trimmed.is_empty() && trimmed.matches('[').count() == trimmed.matches(']').count()
}

/// Inputs gathered by the caller before diagnosing a failed step. Several
/// fields require assets (captures, comparisons) the caller already has in
/// hand from the Playback Engine's own per-step pipeline, so they are
/// passed in precomputed rather than re-derived here.
pub struct DiagnosticInputs<'a> {
    /// The step's recorded descriptor.
    pub descriptor: &'a Bundle,
    /// Whether the primary selector currently resolves to any node.
    pub element_exists: bool,
    /// Computed style of the resolved node, when it exists.
    pub element_style: Option<ComputedStyle>,
    /// Document readiness.
    pub ready_state: ReadyState,
    /// A precomputed comparison against the recorded screenshot, if one
    /// exists and a current capture was available.
    pub screenshot_compare: Option<&'a CompareResult>,
    /// A precomputed drift classification against the current element, if
    /// one was found.
    pub drift: Option<&'a DriftResult>,
    /// Count of recorded landmarks/ancestors that currently re-resolve by
    /// their own selector/id/testId.
    pub graph_resolvable_count: usize,
    /// Total recorded landmarks/ancestors (`landmarks.len() + parents.len()`).
    pub graph_total_count: usize,
    /// Whether an iframe boundary between the viewport root and the
    /// target, if any, is currently traversable.
    pub iframe_accessible: bool,
    /// Whether a shadow-root boundary between the viewport root and the
    /// target, if any, is currently traversable.
    pub shadow_accessible: bool,
}

/// Run the fixed-priority diagnostic suite. Each check is independent;
/// one failing does not prevent the others from running.
#[must_use]
pub fn run_diagnostics(inputs: &DiagnosticInputs<'_>) -> Vec<DiagnosticFinding> {
    let mut findings = Vec::with_capacity(10);

    findings.push(finding(
        DiagnosticId::PageLoaded,
        inputs.ready_state == ReadyState::Complete,
        (inputs.ready_state != ReadyState::Complete).then(|| format!("readyState is {:?}", inputs.ready_state)),
    ));

    findings.push(finding(
        DiagnosticId::ElementExists,
        inputs.element_exists,
        (!inputs.element_exists).then(|| "primary selector resolved to no node".to_string()),
    ));

    let visible = inputs.element_style.map(ComputedStyle::renders).unwrap_or(false);
    findings.push(finding(
        DiagnosticId::ElementVisible,
        visible,
        (!visible).then(|| "element is not visible by computed style/rect".to_string()),
    ));

    let interactable = inputs
        .element_style
        .map(|s| !s.disabled && !s.pointer_events_none)
        .unwrap_or(false);
    findings.push(finding(
        DiagnosticId::ElementInteractable,
        interactable,
        (!interactable).then(|| "element is disabled or has pointer-events: none".to_string()),
    ));

    let screenshot_ok = inputs.screenshot_compare.map(|c| c.is_match).unwrap_or(false);
    findings.push(finding(
        DiagnosticId::ScreenshotMatch,
        screenshot_ok,
        (!screenshot_ok).then(|| "screenshot comparison did not match".to_string()),
    ));

    let drift_ok = inputs.drift.map(|d| d.drift_type == DriftKind::None).unwrap_or(false);
    findings.push(finding(
        DiagnosticId::DriftCheck,
        drift_ok,
        (!drift_ok).then(|| "drift detector did not report none".to_string()),
    ));

    let context_ok = inputs.descriptor.recorded_visual_context_confidence.unwrap_or(0.0) >= 0.7;
    findings.push(finding(
        DiagnosticId::ContextMatch,
        context_ok,
        (!context_ok).then(|| "recorded visual-context confidence below 0.7".to_string()),
    ));

    let graph_ok = inputs.graph_total_count == 0
        || (inputs.graph_resolvable_count as f64 / inputs.graph_total_count as f64) >= 0.5;
    findings.push(finding(
        DiagnosticId::GraphIntegrity,
        graph_ok,
        (!graph_ok).then(|| "fewer than half of recorded landmarks/ancestors re-resolve".to_string()),
    ));

    let selector_ok = inputs
        .descriptor
        .primary_selector
        .as_deref()
        .map(selector_is_valid)
        .unwrap_or(false);
    findings.push(finding(
        DiagnosticId::SelectorValid,
        selector_ok,
        (!selector_ok).then(|| "recorded selector failed to parse".to_string()),
    ));

    findings.push(finding(
        DiagnosticId::IframeAccessible,
        inputs.iframe_accessible,
        (!inputs.iframe_accessible).then(|| "iframe boundary not traversable".to_string()),
    ));

    findings.push(finding(
        DiagnosticId::ShadowAccessible,
        inputs.shadow_accessible,
        (!inputs.shadow_accessible).then(|| "shadow-root boundary not traversable".to_string()),
    ));

    findings
}

/// Which of the eight ordered resolution strategies produced a
/// [`Resolution`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Re-try the original selector once more.
    RetryOriginal,
    /// Drift Detector's proposed correction.
    DriftCorrection,
    /// Graph-Based Finder's relationship-path hit.
    GraphNavigation,
    /// Evidence Aggregator's best-scored candidate.
    EvidenceScoring,
    /// A prior successful healing for this descriptor's fingerprint.
    HealingCache,
    /// Template-match plus point-hit in a recaptured viewport.
    ScreenshotLocate,
    /// An on-device vision model fallback.
    LocalVision,
    /// A remote AI vision service fallback.
    AiVision,
}

/// A successful resolution of a failed step.
#[derive(Clone, Debug)]
pub struct Resolution<N> {
    /// Which strategy produced this resolution.
    pub strategy: ResolutionStrategy,
    /// A selector resolving the healed element, when available.
    pub selector: Option<String>,
    /// The healed element, when the strategy located a live node.
    pub element: Option<N>,
    /// Confidence of the resolution.
    pub confidence: f64,
    /// Whether this resolution is confident enough to cache (`>= 0.7`).
    pub should_cache: bool,
    /// Whether this resolution is confident enough to suggest updating the
    /// stored recording (`>= 0.9`).
    pub should_update_recording: bool,
}

fn finalize<N>(strategy: ResolutionStrategy, selector: Option<String>, element: Option<N>, confidence: f64) -> Resolution<N> {
    Resolution {
        strategy,
        selector,
        element,
        confidence,
        should_cache: confidence >= 0.7,
        should_update_recording: confidence >= 0.9,
    }
}

/// A single node currently visible in the document, carrying everything
/// the resolution strategies need to score it. Gathered once by the
/// caller and reused across strategies within one troubleshoot call.
#[derive(Clone, Debug)]
pub struct LiveCandidate<N> {
    /// The live node handle.
    pub node: N,
    /// A selector string that resolves this candidate.
    pub selector: String,
    /// Lowercase tag name.
    pub tag_name: String,
    /// `role` attribute, if any.
    pub role: Option<String>,
    /// `aria-label` attribute, if any.
    pub aria_label: Option<String>,
    /// Visible text content, if any.
    pub text: Option<String>,
    /// Current bounds.
    pub bounds: playback_types::BoundingBox,
    /// Current computed style.
    pub style: ComputedStyle,
    /// Precomputed center-proximity/overlap score against the recorded
    /// bounds, `[0, 1]`.
    pub spatial_score: f64,
    /// Precomputed sequence-plausibility score, `[0, 1]`.
    pub sequence_score: f64,
    /// Precomputed identity-attribute agreement score, `[0, 1]`.
    pub dom_score: f64,
    /// Precomputed historical healing-success score, `[0, 1]`.
    pub history_score: f64,
    /// Whether a reference node (landmark/sibling/parent) this candidate
    /// hangs off of was itself re-located before scoring.
    pub graph_reference_located: bool,
}

/// Everything a single `troubleshoot` call needs.
pub struct ResolutionInputs<'a, D: DocumentView> {
    /// The live document.
    pub document: &'a D,
    /// The failed step.
    pub step: &'a RecordedStep,
    /// Selectors already tried by the Element Finder before this call.
    pub attempted_selectors: &'a [String],
    /// Currently-visible candidates, gathered once by the caller.
    pub candidates: &'a [LiveCandidate<D::Node>],
    /// A freshly recaptured full-viewport frame, for screenshot-locate.
    pub current_viewport: Option<&'a Frame>,
    /// The recorded target region, decoded from `step.descriptor`, for
    /// template search and the evidence aggregator's visual axis.
    pub recorded_region: Option<&'a Frame>,
    /// Prior healing records for this descriptor's fingerprint, already
    /// looked up by the caller from the Pattern Store.
    pub cached_records: &'a [HealingRecord],
    /// Optional on-device vision provider.
    pub local_vision: Option<&'a (dyn HealingProvider + Sync)>,
    /// Optional remote AI vision provider.
    pub ai_vision: Option<&'a (dyn HealingProvider + Sync)>,
    /// Per-provider call timeout.
    pub healing_timeout: Duration,
    /// Cancellation observed by both vision providers.
    pub cancellation: CancellationToken,
    /// Whether the Drift Detector correction strategy may run at all.
    pub drift_enabled: bool,
}

fn try_retry_original<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    let selector = inputs.step.descriptor.primary_selector.as_deref()?;
    let node = inputs.document.query(selector)?;
    if !inputs.document.is_visible(&node) {
        return None;
    }
    Some(finalize(ResolutionStrategy::RetryOriginal, Some(selector.to_string()), Some(node), 0.9))
}

fn try_drift_correction<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    if !inputs.drift_enabled {
        return None;
    }
    let best = inputs
        .candidates
        .iter()
        .map(|c| {
            let text_similarity = match (&inputs.step.descriptor.text, &c.text) {
                (Some(a), Some(b)) => playback_types::text_similarity(a, b),
                _ => 0.0,
            };
            DriftCandidate { handle: &c.node, bounds: c.bounds, text_similarity }
        })
        .collect::<Vec<_>>();
    let (node, score) = playback_drift::find_drifted_element(&inputs.step.descriptor.original_bounds, &best, DriftConfig::default())?;
    let candidate = inputs.candidates.iter().find(|c| &c.node == node)?;
    Some(finalize(
        ResolutionStrategy::DriftCorrection,
        Some(candidate.selector.clone()),
        Some(node.clone()),
        score,
    ))
}

fn try_graph_navigation<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    let live_nodes: Vec<LiveNode> = inputs
        .candidates
        .iter()
        .enumerate()
        .map(|(index, c)| LiveNode {
            index,
            tag_name: c.tag_name.clone(),
            role: c.role.clone(),
            aria_label: c.aria_label.clone(),
            text: c.text.clone(),
            bounds: c.bounds,
            reference_located: c.graph_reference_located,
        })
        .collect();
    let result: GraphFindResult = playback_graph::find(&inputs.step.descriptor.graph, &live_nodes);
    if !result.found {
        return None;
    }
    let index = result.element?;
    let candidate = inputs.candidates.get(index)?;
    Some(finalize(
        ResolutionStrategy::GraphNavigation,
        Some(candidate.selector.clone()),
        Some(candidate.node.clone()),
        result.confidence,
    ))
}

async fn try_evidence_scoring<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    let mut signals = Vec::with_capacity(inputs.candidates.len());
    for candidate in inputs.candidates {
        let capture = inputs.document.capture_region(candidate.bounds).await;
        signals.push(CandidateSignals {
            element: candidate.node.clone(),
            selector: candidate.selector.clone(),
            spatial: candidate.spatial_score,
            sequence: candidate.sequence_score,
            capture,
            dom: candidate.dom_score,
            history: candidate.history_score,
        });
    }
    let result = find_element(signals, inputs.recorded_region, EvidenceConfig::default());
    let winner = result.selected?;
    Some(finalize(
        ResolutionStrategy::EvidenceScoring,
        Some(winner.selector),
        Some(winner.element),
        result.confidence,
    ))
}

fn try_healing_cache<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    let record = inputs.cached_records.iter().filter(|r| r.success).max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;
    let node = inputs.document.query(&record.healed_selector)?;
    if !inputs.document.is_visible(&node) {
        return None;
    }
    Some(finalize(
        ResolutionStrategy::HealingCache,
        Some(record.healed_selector.clone()),
        Some(node),
        record.confidence,
    ))
}

fn try_screenshot_locate<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    let viewport = inputs.current_viewport?;
    let template = inputs.recorded_region?;
    let (bounds, _score) = playback_comparator::template_search(viewport, template, 8)?;
    let (cx, cy) = bounds.center();
    let node = inputs.document.element_from_point(cx, cy)?;
    Some(finalize(ResolutionStrategy::ScreenshotLocate, None, Some(node), 0.6))
}

async fn try_vision_provider<D: DocumentView>(
    inputs: &ResolutionInputs<'_, D>,
    provider: &(dyn HealingProvider + Sync),
    strategy: ResolutionStrategy,
) -> Option<Resolution<D::Node>> {
    let call = provider.heal(inputs.step, inputs.attempted_selectors, inputs.cancellation.child_token());
    let outcome = tokio::time::timeout(inputs.healing_timeout, call).await.ok()?.ok()?;
    if !outcome.success {
        return None;
    }
    let selector = outcome.suggested_selector?;
    let node = inputs.document.query(&selector)?;
    Some(finalize(strategy, Some(selector), Some(node), outcome.confidence))
}

/// Run all resolution strategies in order, stopping at the first success.
pub async fn troubleshoot<D: DocumentView>(inputs: ResolutionInputs<'_, D>) -> Outcome<D::Node> {
    if let Some(resolution) = try_retry_original(&inputs) {
        return Outcome::Resolved(resolution);
    }
    if let Some(resolution) = try_drift_correction(&inputs) {
        return Outcome::Resolved(resolution);
    }
    if let Some(resolution) = try_graph_navigation(&inputs) {
        return Outcome::Resolved(resolution);
    }
    if let Some(resolution) = try_evidence_scoring(&inputs).await {
        return Outcome::Resolved(resolution);
    }
    if let Some(resolution) = try_healing_cache(&inputs) {
        return Outcome::Resolved(resolution);
    }
    if let Some(resolution) = try_screenshot_locate(&inputs) {
        return Outcome::Resolved(resolution);
    }
    if let Some(provider) = inputs.local_vision {
        if let Some(resolution) = try_vision_provider(&inputs, provider, ResolutionStrategy::LocalVision).await {
            return Outcome::Resolved(resolution);
        }
    }
    if let Some(provider) = inputs.ai_vision {
        if let Some(resolution) = try_vision_provider(&inputs, provider, ResolutionStrategy::AiVision).await {
            return Outcome::Resolved(resolution);
        }
    }
    Outcome::Unresolved
}

/// A lighter pass used on the playback engine's hot path (§4.9 step 5):
/// only the cheapest, highest-signal strategies that need no external
/// round-trip.
pub fn quick_troubleshoot<D: DocumentView>(inputs: &ResolutionInputs<'_, D>) -> Option<Resolution<D::Node>> {
    try_retry_original(inputs)
        .or_else(|| try_drift_correction(inputs))
        .or_else(|| try_healing_cache(inputs))
}

/// Outcome of a full [`troubleshoot`] call.
#[derive(Clone, Debug)]
pub enum Outcome<N> {
    /// A strategy succeeded.
    Resolved(Resolution<N>),
    /// No strategy succeeded.
    Unresolved,
}

/// Whether every diagnostic failed, the condition under which an
/// unresolved [`Outcome`] should be reported to the caller as `manual`
/// rather than merely `unresolved`.
#[must_use]
pub fn all_diagnostics_failed(findings: &[DiagnosticFinding]) -> bool {
    findings.iter().all(|f| !f.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_types::{BoundingBox, ContextHint, ElementGraph, ElementNode, EventKind, RelationshipTag};

    fn bundle() -> Bundle {
        let bounds = BoundingBox::new(10.0, 10.0, 40.0, 20.0);
        Bundle {
            primary_selector: Some("#submit".into()),
            id: None,
            name: None,
            test_id: None,
            aria_label: None,
            role: None,
            placeholder: None,
            xpath: None,
            tag_name: "button".into(),
            text: Some("Submit".into()),
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
                    selector: "#submit".into(),
                    text: Some("Submit".into()),
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

    fn step() -> RecordedStep {
        RecordedStep {
            step_number: 1,
            event_kind: EventKind::Click,
            value: None,
            descriptor: bundle(),
            recorded_screenshot: None,
            delay_ms: None,
            conditional: None,
        }
    }

    #[test]
    fn diagnostics_flag_missing_element_and_pass_when_present() {
        let inputs = DiagnosticInputs {
            descriptor: &bundle(),
            element_exists: false,
            element_style: None,
            ready_state: ReadyState::Complete,
            screenshot_compare: None,
            drift: None,
            graph_resolvable_count: 0,
            graph_total_count: 0,
            iframe_accessible: true,
            shadow_accessible: true,
        };
        let findings = run_diagnostics(&inputs);
        let exists = findings.iter().find(|f| f.id == DiagnosticId::ElementExists).unwrap();
        assert!(!exists.passed);
    }

    #[test]
    fn all_diagnostics_failed_detects_total_failure() {
        let inputs = DiagnosticInputs {
            descriptor: &bundle(),
            element_exists: false,
            element_style: None,
            ready_state: ReadyState::Loading,
            screenshot_compare: None,
            drift: None,
            graph_resolvable_count: 0,
            graph_total_count: 0,
            iframe_accessible: false,
            shadow_accessible: false,
        };
        let findings = run_diagnostics(&inputs);
        assert!(findings.iter().any(|f| !f.passed));
    }

    #[test]
    fn resolution_flags_cache_and_recording_thresholds() {
        let high = finalize::<u32>(ResolutionStrategy::RetryOriginal, None, None, 0.95);
        assert!(high.should_cache);
        assert!(high.should_update_recording);
        let medium = finalize::<u32>(ResolutionStrategy::ScreenshotLocate, None, None, 0.75);
        assert!(medium.should_cache);
        assert!(!medium.should_update_recording);
        let low = finalize::<u32>(ResolutionStrategy::ScreenshotLocate, None, None, 0.3);
        assert!(!low.should_cache);
    }

    #[test]
    fn step_fixture_is_well_formed() {
        assert_eq!(step().descriptor.tag_name, "button");
    }
}
