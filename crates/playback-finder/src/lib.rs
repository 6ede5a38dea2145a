//! Element Finder (C6).
//!
//! Polls a fixed, confidence-ordered strategy list until a candidate clears
//! both context validation and the visibility policy, or `timeout` elapses.
//! See `SPEC_FULL.md` §4.6.
#![warn(missing_docs)]

use std::time::Duration;

use playback_adapters::DocumentView;
use playback_evidence::{Surface, infer_surface, validate};
use playback_types::{Bundle, ContextHint};
use tokio::time::Instant;

/// Which of the nine ordered strategies produced or attempted a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindStrategy {
    /// The recorded primary selector.
    PrimarySelector,
    /// `data-testid` (or equivalent) lookup.
    TestId,
    /// `id` attribute lookup.
    Id,
    /// `name` attribute lookup.
    Name,
    /// The recorded XPath expression.
    Xpath,
    /// `aria-label` attribute lookup.
    AriaLabel,
    /// A well-known inner-input selector for the descriptor's surface.
    ContextSurface,
    /// A hit-test at the recorded center, plus a small neighborhood of offsets.
    BoundsHit,
    /// `placeholder` attribute lookup.
    Placeholder,
}

impl FindStrategy {
    /// Confidence assigned to a hit from this strategy.
    #[must_use]
    pub fn confidence(self) -> f64 {
        match self {
            FindStrategy::PrimarySelector => 1.0,
            FindStrategy::TestId => 0.95,
            FindStrategy::Id => 0.9,
            FindStrategy::Name => 0.85,
            FindStrategy::Xpath => 0.8,
            FindStrategy::AriaLabel => 0.75,
            FindStrategy::ContextSurface => 0.7,
            FindStrategy::BoundsHit => 0.6,
            FindStrategy::Placeholder => 0.65,
        }
    }

    /// Fixed attempt order, per §4.6.
    #[must_use]
    pub fn order() -> [FindStrategy; 9] {
        [
            FindStrategy::PrimarySelector,
            FindStrategy::TestId,
            FindStrategy::Id,
            FindStrategy::Name,
            FindStrategy::Xpath,
            FindStrategy::AriaLabel,
            FindStrategy::ContextSurface,
            FindStrategy::BoundsHit,
            FindStrategy::Placeholder,
        ]
    }
}

/// A single failed attempt recorded while polling.
#[derive(Clone, Debug)]
pub struct FindAttempt {
    /// The strategy that was tried.
    pub strategy: FindStrategy,
    /// Why the attempt did not produce a usable element.
    pub reason: String,
}

/// Outcome of [`find`].
#[derive(Clone, Debug)]
pub struct ElementFindResult<N> {
    /// The resolved element, when found before `timeout`.
    pub element: Option<N>,
    /// The strategy that produced the hit.
    pub strategy: Option<FindStrategy>,
    /// Confidence of the hit.
    pub confidence: f64,
    /// Whether the hit passed context validation (always `true` when `element` is `Some`).
    pub context_valid: bool,
    /// Failed attempts collected across every poll iteration.
    pub attempts: Vec<FindAttempt>,
}

const BOUNDS_HIT_OFFSETS: [(f64, f64); 9] = [
    (0.0, 0.0),
    (-5.0, 0.0),
    (5.0, 0.0),
    (0.0, -5.0),
    (0.0, 5.0),
    (-5.0, -5.0),
    (5.0, 5.0),
    (-5.0, 5.0),
    (5.0, -5.0),
];

fn context_surface_selector(hint: ContextHint) -> Option<&'static str> {
    match hint {
        ContextHint::Terminal => Some("textarea.xterm-helper-textarea, [data-terminal-input]"),
        ContextHint::ChatSurface => Some("[data-chat-input], textarea[data-chat]"),
        ContextHint::RichTextSurface => Some("[contenteditable='true']"),
        ContextHint::Generic => None,
    }
}

fn try_strategy<D: DocumentView>(document: &D, descriptor: &Bundle, strategy: FindStrategy) -> Option<D::Node> {
    match strategy {
        FindStrategy::PrimarySelector => descriptor.primary_selector.as_deref().and_then(|s| document.query(s)),
        FindStrategy::TestId => descriptor
            .test_id
            .as_deref()
            .and_then(|id| document.query(&format!("[data-testid=\"{id}\"]"))),
        FindStrategy::Id => descriptor.id.as_deref().and_then(|id| document.by_id(id)),
        FindStrategy::Name => descriptor.name.as_deref().and_then(|name| document.by_name(name)),
        FindStrategy::Xpath => descriptor.xpath.as_deref().and_then(|xpath| document.by_xpath(xpath)),
        FindStrategy::AriaLabel => descriptor
            .aria_label
            .as_deref()
            .and_then(|label| document.query(&format!("[aria-label=\"{label}\"]"))),
        FindStrategy::ContextSurface => context_surface_selector(descriptor.context_hint).and_then(|sel| document.query(sel)),
        FindStrategy::BoundsHit => {
            let (cx, cy) = descriptor.original_bounds.center();
            BOUNDS_HIT_OFFSETS
                .iter()
                .find_map(|(dx, dy)| document.element_from_point(cx + dx, cy + dy))
        }
        FindStrategy::Placeholder => descriptor
            .placeholder
            .as_deref()
            .and_then(|placeholder| document.query(&format!("[placeholder=\"{placeholder}\"]"))),
    }
}

fn actual_surface<D: DocumentView>(document: &D, node: &D::Node) -> Surface {
    let mut tokens = Vec::new();
    if let Some(class) = document.attribute(node, "class") {
        tokens.extend(class.split_whitespace().map(str::to_string));
    }
    for ancestor in document.ancestor_chain(node) {
        if let Some(class) = document.attribute(&ancestor, "class") {
            tokens.extend(class.split_whitespace().map(str::to_string));
        }
    }
    infer_surface(&tokens, None)
}

/// Try each strategy, in order, gated by context validation and visibility,
/// repolling until `timeout` elapses.
pub async fn find<D: DocumentView>(document: &D, descriptor: &Bundle, timeout: Duration) -> ElementFindResult<D::Node> {
    let deadline = Instant::now() + timeout;
    let expected = Surface::from(descriptor.context_hint);
    let mut attempts = Vec::new();

    loop {
        for strategy in FindStrategy::order() {
            let Some(node) = try_strategy(document, descriptor, strategy) else {
                continue;
            };

            if !document.is_visible(&node) {
                attempts.push(FindAttempt {
                    strategy,
                    reason: "candidate failed the visibility policy".to_string(),
                });
                continue;
            }

            let validation = validate(expected, actual_surface(document, &node));
            if !validation.is_valid {
                attempts.push(FindAttempt {
                    strategy,
                    reason: validation
                        .reason
                        .unwrap_or_else(|| "context validation failed".to_string()),
                });
                continue;
            }

            return ElementFindResult {
                element: Some(node),
                strategy: Some(strategy),
                confidence: strategy.confidence(),
                context_valid: true,
                attempts,
            };
        }

        if Instant::now() >= deadline {
            return ElementFindResult {
                element: None,
                strategy: None,
                confidence: 0.0,
                context_valid: false,
                attempts,
            };
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_adapters::{ComputedStyle, EventInit, Frame, ReadyState};
    use playback_types::{BoundingBox, ElementGraph, ElementNode, RelationshipTag};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    struct NodeId(u32);

    struct FakeNode {
        id: NodeId,
        selector_hits: Vec<String>,
        tag: String,
        class: Option<String>,
        bounds: BoundingBox,
        visible: bool,
    }

    struct FakeDocument {
        nodes: Mutex<Vec<FakeNode>>,
    }

    #[async_trait::async_trait]
    impl DocumentView for FakeDocument {
        type Node = NodeId;

        fn query(&self, selector: &str) -> Option<Self::Node> {
            self.nodes
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.selector_hits.iter().any(|s| s == selector))
                .map(|n| n.id.clone())
        }
        fn query_all(&self, _selector: &str) -> Vec<Self::Node> {
            Vec::new()
        }
        fn by_id(&self, _id: &str) -> Option<Self::Node> {
            None
        }
        fn by_name(&self, _name: &str) -> Option<Self::Node> {
            None
        }
        fn by_xpath(&self, _xpath: &str) -> Option<Self::Node> {
            None
        }
        fn element_from_point(&self, _x: f64, _y: f64) -> Option<Self::Node> {
            None
        }
        fn computed_style(&self, node: &Self::Node) -> ComputedStyle {
            let nodes = self.nodes.lock().unwrap();
            let found = nodes.iter().find(|n| n.id == *node).unwrap();
            ComputedStyle {
                displayed: found.visible,
                visible: found.visible,
                opaque: found.visible,
                pointer_events_none: false,
                disabled: false,
                hidden_input_proxy: false,
            }
        }
        fn bounding_rect(&self, node: &Self::Node) -> Option<BoundingBox> {
            self.nodes.lock().unwrap().iter().find(|n| n.id == *node).map(|n| n.bounds)
        }
        fn dispatch(&self, _node: &Self::Node, _event_name: &str, _init: EventInit) {}
        fn focus(&self, _node: &Self::Node) -> bool {
            true
        }
        fn scroll_into_view(&self, _node: &Self::Node) {}
        async fn capture_viewport(&self) -> Option<Frame> {
            None
        }
        async fn capture_region(&self, _bounds: BoundingBox) -> Option<Frame> {
            None
        }
        fn ready_state(&self) -> ReadyState {
            ReadyState::Complete
        }
        fn tag_name(&self, node: &Self::Node) -> String {
            self.nodes.lock().unwrap().iter().find(|n| n.id == *node).unwrap().tag.clone()
        }
        fn attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
            if name == "class" {
                self.nodes.lock().unwrap().iter().find(|n| n.id == *node).and_then(|n| n.class.clone())
            } else {
                None
            }
        }
        fn text_content(&self, _node: &Self::Node) -> Option<String> {
            None
        }
        fn parent(&self, _node: &Self::Node) -> Option<Self::Node> {
            None
        }
        fn children(&self, _node: &Self::Node) -> Vec<Self::Node> {
            Vec::new()
        }
        fn siblings(&self, _node: &Self::Node) -> Vec<Self::Node> {
            Vec::new()
        }
        fn ancestor_chain(&self, _node: &Self::Node) -> Vec<Self::Node> {
            Vec::new()
        }
        fn set_native_value(&self, _node: &Self::Node, _value: &str) -> bool {
            false
        }
    }

    fn sample_descriptor() -> Bundle {
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

    #[tokio::test]
    async fn primary_selector_hit_wins_immediately() {
        let document = FakeDocument {
            nodes: Mutex::new(vec![FakeNode {
                id: NodeId(1),
                selector_hits: vec!["#submit".into()],
                tag: "button".into(),
                class: None,
                bounds: BoundingBox::new(10.0, 10.0, 40.0, 20.0),
                visible: true,
            }]),
        };
        let result = find(&document, &sample_descriptor(), Duration::from_millis(200)).await;
        assert_eq!(result.element, Some(NodeId(1)));
        assert_eq!(result.strategy, Some(FindStrategy::PrimarySelector));
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn times_out_when_nothing_matches() {
        let document = FakeDocument { nodes: Mutex::new(Vec::new()) };
        let result = find(&document, &sample_descriptor(), Duration::from_millis(80)).await;
        assert!(result.element.is_none());
        assert!(!result.context_valid);
    }

    #[tokio::test]
    async fn skips_invisible_candidate_and_reports_attempt() {
        let document = FakeDocument {
            nodes: Mutex::new(vec![FakeNode {
                id: NodeId(1),
                selector_hits: vec!["#submit".into()],
                tag: "button".into(),
                class: None,
                bounds: BoundingBox::new(10.0, 10.0, 40.0, 20.0),
                visible: false,
            }]),
        };
        let result = find(&document, &sample_descriptor(), Duration::from_millis(80)).await;
        assert!(result.element.is_none());
        assert!(!result.attempts.is_empty());
    }
}
