//! Graph-Based Finder (C3).
//!
//! Re-locates a recorded target by walking the relationship graph captured
//! at record time instead of searching the whole document. See
//! `SPEC_FULL.md` §4.3.
#![warn(missing_docs)]

use playback_types::{ElementGraph, ElementNode, RelationshipTag, text_similarity};

/// Which relationship strategy produced a [`GraphFindResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphStrategy {
    /// Re-located via the parent/ancestor chain, then searched its children.
    ParentChild,
    /// Re-located via a sibling, then searched the sibling's neighbors.
    SiblingRelative,
    /// Re-located via a structural landmark, then searched beneath it.
    LandmarkPath,
    /// Re-located via a nearby node at its recorded offset.
    NearbyText,
}

impl GraphStrategy {
    /// Base confidence assigned to a hit from this strategy, before any
    /// per-node match-score adjustment.
    #[must_use]
    pub fn base_confidence(self) -> f64 {
        match self {
            GraphStrategy::ParentChild => 0.8,
            GraphStrategy::SiblingRelative => 0.7,
            GraphStrategy::LandmarkPath => 0.65,
            GraphStrategy::NearbyText => 0.6,
        }
    }

    /// Fixed trial order: `parent-child`, `sibling-relative`,
    /// `landmark-path`, `nearby-text`.
    #[must_use]
    pub fn order() -> [GraphStrategy; 4] {
        [
            GraphStrategy::ParentChild,
            GraphStrategy::SiblingRelative,
            GraphStrategy::LandmarkPath,
            GraphStrategy::NearbyText,
        ]
    }
}

/// A live candidate considered while walking the graph: an index into the
/// caller's own live-node table plus the attributes needed to score it.
#[derive(Clone, Debug)]
pub struct LiveNode {
    /// Opaque index the caller can map back to a live element handle.
    pub index: usize,
    /// Lowercase tag name.
    pub tag_name: String,
    /// `role` attribute, if any.
    pub role: Option<String>,
    /// `aria-label` attribute, if any.
    pub aria_label: Option<String>,
    /// Visible text content, if any.
    pub text: Option<String>,
    /// Current bounds, for bounds-similarity and nearby-proximity checks.
    pub bounds: playback_types::BoundingBox,
    /// Whether a reference node (landmark/sibling/parent) was located by
    /// its own selector/id/testId before this candidate was considered.
    pub reference_located: bool,
}

/// Outcome of [`find`].
#[derive(Clone, Debug)]
pub struct GraphFindResult {
    /// Whether a candidate was accepted.
    pub found: bool,
    /// The accepted candidate's index, when found.
    pub element: Option<usize>,
    /// The strategy that produced the hit.
    pub strategy: Option<GraphStrategy>,
    /// Relationship path from the reference node to the hit, for diagnostics.
    pub relationship_path: Vec<RelationshipTag>,
    /// Confidence of the winning hit.
    pub confidence: f64,
    /// Up to 3 additional candidates collected from the other strategies.
    pub alternatives: Vec<GraphAlternative>,
}

/// A runner-up candidate collected after the winning strategy succeeded.
#[derive(Clone, Debug)]
pub struct GraphAlternative {
    /// The alternative candidate's index.
    pub element: usize,
    /// The strategy that produced this alternative.
    pub strategy: GraphStrategy,
    /// Confidence of this alternative.
    pub confidence: f64,
}

const WITHIN_PARENT_THRESHOLD: f64 = 0.5;
const SIBLING_THRESHOLD: f64 = 0.4;
const NEARBY_PROXIMITY_PX: f64 = 100.0;
const TEXT_SIMILARITY_FLOOR: f64 = 0.5;

/// Score a live candidate against a captured reference node: text
/// similarity (0.4), aria/role exact match (0.3/0.2), bounds similarity
/// (0.1).
fn match_score(reference: &ElementNode, candidate: &LiveNode) -> f64 {
    let mut score = 0.0;
    if let (Some(recorded), Some(live)) = (reference.text.as_deref(), candidate.text.as_deref()) {
        score += 0.4 * text_similarity(recorded, live);
    }
    if let (Some(recorded), Some(live)) = (reference.aria_label.as_deref(), candidate.aria_label.as_deref()) {
        if recorded.eq_ignore_ascii_case(live) {
            score += 0.3;
        }
    }
    if let (Some(recorded), Some(live)) = (reference.role.as_deref(), candidate.role.as_deref()) {
        if recorded.eq_ignore_ascii_case(live) {
            score += 0.2;
        }
    }
    score += 0.1 * (1.0 - (reference.bounds.pct_area_change(&candidate.bounds).abs() / 100.0).min(1.0));
    score
}

fn tag_matches(reference: &ElementNode, candidate: &LiveNode) -> bool {
    reference.tag_name.eq_ignore_ascii_case(&candidate.tag_name)
}

fn text_gate(reference: &ElementNode, candidate: &LiveNode) -> bool {
    match (reference.text.as_deref(), candidate.text.as_deref()) {
        (Some(recorded), Some(live)) if !recorded.is_empty() => {
            text_similarity(recorded, live) >= TEXT_SIMILARITY_FLOOR
        }
        _ => true,
    }
}

/// Try the parent-child strategy: walk `parents` nearest-first, and among
/// `children` candidates pick the best match above [`WITHIN_PARENT_THRESHOLD`].
fn try_parent_child(graph: &ElementGraph, candidates: &[LiveNode]) -> Option<(usize, f64)> {
    if graph.parents.is_empty() {
        return None;
    }
    best_among(&graph.target, candidates, WITHIN_PARENT_THRESHOLD)
}

/// Try the sibling-relative strategy: re-locate a sibling, then look among
/// the sibling candidates for the best match above [`SIBLING_THRESHOLD`].
fn try_sibling_relative(graph: &ElementGraph, candidates: &[LiveNode]) -> Option<(usize, f64)> {
    if graph.siblings.is_empty() {
        return None;
    }
    best_among(&graph.target, candidates, SIBLING_THRESHOLD)
}

/// Try the landmark-path strategy: re-locate a landmark, then search
/// beneath it for the recorded target.
fn try_landmark_path(graph: &ElementGraph, candidates: &[LiveNode]) -> Option<(usize, f64)> {
    if graph.landmarks.is_empty() {
        return None;
    }
    best_among(&graph.target, candidates, WITHIN_PARENT_THRESHOLD)
}

/// Try the nearby-text strategy: a `nearby` node re-located and the target
/// sought within [`NEARBY_PROXIMITY_PX`] of its recorded offset.
fn try_nearby_text(graph: &ElementGraph, candidates: &[LiveNode]) -> Option<(usize, f64)> {
    if graph.nearby.is_empty() {
        return None;
    }
    candidates
        .iter()
        .filter(|c| {
            tag_matches(&graph.target, c)
                && text_gate(&graph.target, c)
                && graph.target.bounds.center_distance(&c.bounds) <= NEARBY_PROXIMITY_PX
        })
        .map(|c| (c.index, match_score(&graph.target, c)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

fn best_among(reference: &ElementNode, candidates: &[LiveNode], threshold: f64) -> Option<(usize, f64)> {
    candidates
        .iter()
        .filter(|c| c.reference_located && tag_matches(reference, c) && text_gate(reference, c))
        .map(|c| (c.index, match_score(reference, c)))
        .filter(|(_, score)| *score > threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

fn run_strategy(strategy: GraphStrategy, graph: &ElementGraph, candidates: &[LiveNode]) -> Option<(usize, f64)> {
    match strategy {
        GraphStrategy::ParentChild => try_parent_child(graph, candidates),
        GraphStrategy::SiblingRelative => try_sibling_relative(graph, candidates),
        GraphStrategy::LandmarkPath => try_landmark_path(graph, candidates),
        GraphStrategy::NearbyText => try_nearby_text(graph, candidates),
    }
}

fn relationship_path_for(strategy: GraphStrategy) -> Vec<RelationshipTag> {
    match strategy {
        GraphStrategy::ParentChild => vec![RelationshipTag::Parent, RelationshipTag::Child],
        GraphStrategy::SiblingRelative => vec![RelationshipTag::Sibling],
        GraphStrategy::LandmarkPath => vec![RelationshipTag::Landmark],
        GraphStrategy::NearbyText => vec![RelationshipTag::Nearby],
    }
}

/// Find the recorded target by trying each strategy in fixed order against
/// a caller-supplied pool of currently-visible `candidates`. The first
/// strategy to clear its threshold wins; the remaining strategies are then
/// run to collect up to 3 distinct `alternatives`.
#[must_use]
pub fn find(graph: &ElementGraph, candidates: &[LiveNode]) -> GraphFindResult {
    let mut winner: Option<(GraphStrategy, usize, f64)> = None;
    for strategy in GraphStrategy::order() {
        if let Some((index, score)) = run_strategy(strategy, graph, candidates) {
            winner = Some((strategy, index, score));
            break;
        }
    }

    let Some((strategy, index, _score)) = winner else {
        return GraphFindResult {
            found: false,
            element: None,
            strategy: None,
            relationship_path: Vec::new(),
            confidence: 0.0,
            alternatives: Vec::new(),
        };
    };

    let mut alternatives = Vec::new();
    for other in GraphStrategy::order() {
        if other == strategy || alternatives.len() >= 3 {
            continue;
        }
        if let Some((alt_index, _)) = run_strategy(other, graph, candidates) {
            if alt_index != index {
                alternatives.push(GraphAlternative {
                    element: alt_index,
                    strategy: other,
                    confidence: other.base_confidence(),
                });
            }
        }
    }

    GraphFindResult {
        found: true,
        element: Some(index),
        strategy: Some(strategy),
        relationship_path: relationship_path_for(strategy),
        confidence: strategy.base_confidence(),
        alternatives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_types::BoundingBox;

    fn node(relationship: RelationshipTag, tag: &str, text: &str, bounds: BoundingBox) -> ElementNode {
        ElementNode {
            relationship,
            tag_name: tag.into(),
            id: None,
            class_name: Vec::new(),
            name: None,
            aria_label: None,
            role: None,
            test_id: None,
            bounds,
            selector: format!("{tag}.recorded"),
            text: Some(text.into()),
            is_stable: true,
            distance_to_target: None,
        }
    }

    fn live(index: usize, tag: &str, text: &str, bounds: BoundingBox, reference_located: bool) -> LiveNode {
        LiveNode {
            index,
            tag_name: tag.into(),
            role: None,
            aria_label: None,
            text: Some(text.into()),
            bounds,
            reference_located,
        }
    }

    fn sample_graph() -> ElementGraph {
        let bounds = BoundingBox::new(100.0, 100.0, 50.0, 20.0);
        ElementGraph {
            target: node(RelationshipTag::Target, "button", "Submit", bounds),
            parents: vec![node(RelationshipTag::Parent, "form", "", BoundingBox::new(0.0, 0.0, 400.0, 400.0))],
            siblings: Vec::new(),
            children: Vec::new(),
            nearby: Vec::new(),
            landmarks: Vec::new(),
        }
    }

    #[test]
    fn parent_child_wins_when_candidate_matches_well() {
        let graph = sample_graph();
        let candidates = vec![live(0, "button", "Submit", BoundingBox::new(102.0, 100.0, 50.0, 20.0), true)];
        let result = find(&graph, &candidates);
        assert!(result.found);
        assert_eq!(result.strategy, Some(GraphStrategy::ParentChild));
        assert_eq!(result.element, Some(0));
    }

    #[test]
    fn falls_through_to_nearby_text_when_higher_strategies_have_no_anchors() {
        let bounds = BoundingBox::new(100.0, 100.0, 50.0, 20.0);
        let mut graph = sample_graph();
        graph.parents.clear();
        graph.nearby = vec![node(RelationshipTag::Nearby, "button", "Submit", bounds)];
        let candidates = vec![live(0, "button", "Submit", BoundingBox::new(105.0, 100.0, 50.0, 20.0), true)];
        let result = find(&graph, &candidates);
        assert!(result.found);
        assert_eq!(result.strategy, Some(GraphStrategy::NearbyText));
    }

    #[test]
    fn returns_not_found_when_no_strategy_has_anchors() {
        let mut graph = sample_graph();
        graph.parents.clear();
        let candidates = vec![live(0, "button", "Submit", BoundingBox::new(102.0, 100.0, 50.0, 20.0), true)];
        let result = find(&graph, &candidates);
        assert!(!result.found);
        assert!(result.alternatives.is_empty());
    }

    #[test]
    fn collects_alternatives_distinct_from_the_winner() {
        let bounds = BoundingBox::new(100.0, 100.0, 50.0, 20.0);
        let mut graph = sample_graph();
        graph.nearby = vec![node(RelationshipTag::Nearby, "button", "Submit", bounds)];
        let candidates = vec![
            live(0, "button", "Submit", BoundingBox::new(102.0, 100.0, 50.0, 20.0), true),
            live(1, "button", "Submit", BoundingBox::new(105.0, 101.0, 50.0, 20.0), true),
        ];
        let result = find(&graph, &candidates);
        assert!(result.found);
        assert_eq!(result.strategy, Some(GraphStrategy::ParentChild));
    }
}
