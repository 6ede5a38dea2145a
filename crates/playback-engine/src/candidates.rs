//! Candidate gathering for a failed step.
//!
//! Scans the live document once per healing attempt and produces the
//! single `Vec<LiveCandidate<D::Node>>` that every Troubleshooter
//! strategy scores independently (§4.9 step 6). Also resolves the
//! descriptor's graph references (parents/landmarks/siblings) live, both
//! to stamp each candidate's `graph_reference_located` flag and to fill
//! `DiagnosticInputs::graph_resolvable_count`.

use playback_adapters::DocumentView;
use playback_troubleshoot::LiveCandidate;
use playback_types::{Bundle, ElementGraph, ElementNode, HealingRecord, RecordedStep};

use crate::config::EngineConfig;

/// Candidates plus the graph-resolution counts needed by diagnostics.
pub struct GatherResult<N> {
    /// Currently-visible, in-radius candidates, nearest-first.
    pub candidates: Vec<LiveCandidate<N>>,
    /// How many of the descriptor's recorded landmarks/ancestors currently
    /// re-resolve by their own selector/id/testId.
    pub graph_resolvable_count: usize,
    /// Total recorded landmarks/ancestors (`landmarks.len() + parents.len()`).
    pub graph_total_count: usize,
}

fn resolve_single<D: DocumentView>(document: &D, node: &ElementNode) -> Option<D::Node> {
    if let Some(id) = &node.id {
        if let Some(handle) = document.by_id(id) {
            return Some(handle);
        }
    }
    if let Some(test_id) = &node.test_id {
        if let Some(handle) = document.query(&format!("[data-testid=\"{test_id}\"]")) {
            return Some(handle);
        }
    }
    if !node.selector.is_empty() {
        if let Some(handle) = document.query(&node.selector) {
            return Some(handle);
        }
    }
    None
}

fn resolve_all<D: DocumentView>(document: &D, nodes: &[ElementNode]) -> Vec<D::Node> {
    nodes.iter().filter_map(|n| resolve_single(document, n)).collect()
}

fn graph_resolution_counts<D: DocumentView>(document: &D, graph: &ElementGraph) -> (usize, usize) {
    let total = graph.parents.len() + graph.landmarks.len();
    let resolved = graph
        .parents
        .iter()
        .chain(graph.landmarks.iter())
        .filter(|n| resolve_single(document, n).is_some())
        .count();
    (resolved, total)
}

/// Whether `node` hangs off any live-resolved parent/landmark (as a
/// descendant) or live-resolved sibling (as a sharing-parent peer).
///
/// `D::Node` is only `PartialEq`, not `Hash`/`Eq`, so membership here is a
/// linear scan rather than a set lookup.
fn graph_reference_located<D: DocumentView>(document: &D, node: &D::Node, ancestors_and_landmarks: &[D::Node], siblings: &[D::Node]) -> bool {
    let chain = document.ancestor_chain(node);
    if ancestors_and_landmarks.iter().any(|r| chain.contains(r)) {
        return true;
    }
    if let Some(parent) = document.parent(node) {
        if siblings.iter().any(|s| document.parent(s).as_ref() == Some(&parent)) {
            return true;
        }
    }
    false
}

/// Identity-attribute agreement between `node` and the recorded
/// descriptor: the fraction of comparable attributes (id, testId,
/// ariaLabel, role, tag) that match exactly.
fn dom_agreement_score<D: DocumentView>(document: &D, node: &D::Node, descriptor: &Bundle) -> f64 {
    let mut considered = 0.0;
    let mut matched = 0.0;
    let mut axis = |recorded: Option<&str>, live: Option<String>| {
        if let Some(recorded) = recorded {
            considered += 1.0;
            if live.as_deref().is_some_and(|live| live.eq_ignore_ascii_case(recorded)) {
                matched += 1.0;
            }
        }
    };
    axis(descriptor.id.as_deref(), document.attribute(node, "id"));
    axis(descriptor.test_id.as_deref(), document.attribute(node, "data-testid"));
    axis(descriptor.aria_label.as_deref(), document.attribute(node, "aria-label"));
    axis(descriptor.role.as_deref(), document.attribute(node, "role"));
    considered += 1.0;
    if document.tag_name(node).eq_ignore_ascii_case(&descriptor.tag_name) {
        matched += 1.0;
    }
    if considered <= 0.0 { 0.5 } else { matched / considered }
}

fn history_score(selector: &str, cached_records: &[HealingRecord]) -> f64 {
    cached_records
        .iter()
        .filter(|r| r.success && r.healed_selector == selector)
        .map(|r| r.confidence)
        .fold(0.0_f64, f64::max)
}

/// Best-effort selector for a live node discovered outside the recorded
/// descriptor (a healed candidate, or a strategy that only resolves a
/// live handle and not a selector string).
pub(crate) fn synthesize_selector<D: DocumentView>(document: &D, node: &D::Node) -> String {
    if let Some(id) = document.attribute(node, "id") {
        return format!("#{id}");
    }
    if let Some(test_id) = document.attribute(node, "data-testid") {
        return format!("[data-testid=\"{test_id}\"]");
    }
    if let Some(aria) = document.attribute(node, "aria-label") {
        return format!("[aria-label=\"{aria}\"]");
    }
    document.tag_name(node)
}

/// Gather live candidates for `step`'s descriptor, scored against it and
/// ranked by spatial proximity, nearest `cfg.evidence.max_candidates`
/// first.
pub fn gather<D: DocumentView>(document: &D, step: &RecordedStep, cfg: &EngineConfig, cached_records: &[HealingRecord]) -> GatherResult<D::Node> {
    let descriptor = &step.descriptor;

    let (graph_resolvable_count, graph_total_count) = if cfg.graph_finding_enabled {
        graph_resolution_counts(document, &descriptor.graph)
    } else {
        (0, descriptor.graph.parents.len() + descriptor.graph.landmarks.len())
    };

    let ancestors_and_landmarks = if cfg.graph_finding_enabled {
        let mut reference_nodes = descriptor.graph.parents.clone();
        reference_nodes.extend(descriptor.graph.landmarks.iter().cloned());
        resolve_all(document, &reference_nodes)
    } else {
        Vec::new()
    };
    let resolved_siblings = if cfg.graph_finding_enabled { resolve_all(document, &descriptor.graph.siblings) } else { Vec::new() };

    let mut scored: Vec<(f64, LiveCandidate<D::Node>)> = document
        .query_all(&descriptor.tag_name)
        .into_iter()
        .filter(|node| document.is_visible(node))
        .filter_map(|node| {
            let bounds = document.bounding_rect(&node)?;
            let distance = descriptor.original_bounds.center_distance(&bounds);
            if distance > cfg.candidate_search_radius {
                return None;
            }
            let selector = synthesize_selector(document, &node);
            let spatial_score = (1.0 - (distance / cfg.candidate_search_radius).min(1.0)).max(0.0);
            let sequence_score = (1.0 - (descriptor.original_bounds.pct_area_change(&bounds).abs() / 100.0).min(1.0)).max(0.0);
            let dom_score = dom_agreement_score(document, &node, descriptor);
            let history = history_score(&selector, cached_records);
            let graph_reference_located = graph_reference_located(document, &node, &ancestors_and_landmarks, &resolved_siblings);

            let candidate = LiveCandidate {
                tag_name: document.tag_name(&node),
                role: document.attribute(&node, "role"),
                aria_label: document.attribute(&node, "aria-label"),
                text: document.text_content(&node),
                style: document.computed_style(&node),
                node,
                selector,
                bounds,
                spatial_score,
                sequence_score,
                dom_score,
                history_score: history,
                graph_reference_located,
            };
            Some((spatial_score, candidate))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(cfg.evidence.max_candidates);

    GatherResult {
        candidates: scored.into_iter().map(|(_, c)| c).collect(),
        graph_resolvable_count,
        graph_total_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_testkit::{TestDocument, TestElement};
    use playback_types::{BoundingBox, ContextHint, EventKind, RelationshipTag};

    fn descriptor(tag: &str, bounds: BoundingBox) -> Bundle {
        Bundle {
            primary_selector: Some("#missing".into()),
            id: None,
            name: None,
            test_id: None,
            aria_label: None,
            role: None,
            placeholder: None,
            xpath: None,
            tag_name: tag.into(),
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
                    tag_name: tag.into(),
                    id: None,
                    class_name: Vec::new(),
                    name: None,
                    aria_label: None,
                    role: None,
                    test_id: None,
                    bounds,
                    selector: "#missing".into(),
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

    fn step(tag: &str, bounds: BoundingBox) -> RecordedStep {
        RecordedStep {
            step_number: 1,
            event_kind: EventKind::Click,
            value: None,
            descriptor: descriptor(tag, bounds),
            recorded_screenshot: None,
            delay_ms: None,
            conditional: None,
        }
    }

    #[test]
    fn gathers_only_in_radius_visible_candidates_of_the_recorded_tag() {
        let document = TestDocument::new();
        let original = BoundingBox::new(100.0, 100.0, 40.0, 20.0);
        document.insert(
            TestElement { tag: "button".into(), id: Some("near".into()), bounds: BoundingBox::new(105.0, 100.0, 40.0, 20.0), ..Default::default() },
            None,
        );
        document.insert(
            TestElement { tag: "button".into(), id: Some("far".into()), bounds: BoundingBox::new(5000.0, 5000.0, 40.0, 20.0), ..Default::default() },
            None,
        );
        document.insert(TestElement { tag: "a".into(), id: Some("wrong-tag".into()), bounds: original, ..Default::default() }, None);

        let cfg = EngineConfig::default();
        let result = gather(&document, &step("button", original), &cfg, &[]);

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].selector, "#near");
    }

    #[test]
    fn history_score_reflects_prior_successful_healing_of_the_same_selector() {
        let document = TestDocument::new();
        let original = BoundingBox::new(100.0, 100.0, 40.0, 20.0);
        document.insert(TestElement { tag: "button".into(), id: Some("near".into()), bounds: BoundingBox::new(101.0, 100.0, 40.0, 20.0), ..Default::default() }, None);
        let records = vec![HealingRecord {
            original_fingerprint: "fp".into(),
            healed_selector: "#near".into(),
            strategy: "graph-navigation".into(),
            confidence: 0.81,
            timestamp: 0,
            success: true,
        }];

        let cfg = EngineConfig::default();
        let result = gather(&document, &step("button", original), &cfg, &records);

        assert_eq!(result.candidates[0].history_score, 0.81);
    }
}
