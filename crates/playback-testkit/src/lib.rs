//! Synthetic adapters for exercising the playback core without a real
//! browser or accessibility tree.
//!
//! Mirrors a single in-memory document graph behind [`DocumentView`], plus
//! scriptable [`HealingProvider`] and [`PatternStore`] fakes, so every
//! other crate's tests can drive deterministic scenarios end to end.
#![warn(missing_docs)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use playback_adapters::{
    ComputedStyle, DocumentView, EventInit, Frame, HealResult, HealingProvider, HealingProviderError,
    HealingProviderKind, PatternStore, ReadyState, StoreError,
};
use playback_types::{BoundingBox, HealingRecord, RecordedStep};
use tokio_util::sync::CancellationToken;

/// Opaque handle into a [`TestDocument`]'s element table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TestNode(u64);

/// A single synthetic element.
#[derive(Clone, Debug)]
pub struct TestElement {
    /// Lowercase tag name.
    pub tag: String,
    /// `id` attribute.
    pub id: Option<String>,
    /// `name` attribute.
    pub name: Option<String>,
    /// `data-testid` attribute.
    pub test_id: Option<String>,
    /// `aria-label` attribute.
    pub aria_label: Option<String>,
    /// `role` attribute.
    pub role: Option<String>,
    /// `placeholder` attribute.
    pub placeholder: Option<String>,
    /// `class` attribute tokens.
    pub class: Vec<String>,
    /// Text content.
    pub text: Option<String>,
    /// Current bounds.
    pub bounds: BoundingBox,
    /// Current computed style.
    pub style: ComputedStyle,
    /// The value last assigned via `set_native_value`, when this element
    /// is an `input`/`textarea`.
    pub value: Option<String>,
    parent: Option<u64>,
    children: Vec<u64>,
}

impl Default for TestElement {
    fn default() -> Self {
        Self {
            tag: "div".to_string(),
            id: None,
            name: None,
            test_id: None,
            aria_label: None,
            role: None,
            placeholder: None,
            class: Vec::new(),
            text: None,
            bounds: BoundingBox::new(0.0, 0.0, 0.0, 0.0),
            style: ComputedStyle {
                displayed: true,
                visible: true,
                opaque: true,
                pointer_events_none: false,
                disabled: false,
                hidden_input_proxy: false,
            },
            value: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// A single in-memory document tree, editable by tests and readable
/// through [`DocumentView`].
pub struct TestDocument {
    elements: RwLock<HashMap<u64, TestElement>>,
    next_id: AtomicU64,
    ready_state: RwLock<ReadyState>,
    dispatched: RwLock<Vec<(u64, String, EventInit)>>,
}

impl Default for TestDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDocument {
    /// Create an empty document, ready for immediate interaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            ready_state: RwLock::new(ReadyState::Complete),
            dispatched: RwLock::new(Vec::new()),
        }
    }

    /// Insert an element under `parent` (or at the root, if `None`) and
    /// return its handle.
    pub fn insert(&self, element: TestElement, parent: Option<TestNode>) -> TestNode {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut element = element;
        element.parent = parent.map(|p| p.0);
        self.elements.write().insert(id, element);
        if let Some(parent) = parent {
            if let Some(parent_element) = self.elements.write().get_mut(&parent.0) {
                parent_element.children.push(id);
            }
        }
        TestNode(id)
    }

    /// Remove an element (simulating the target disappearing from the DOM).
    pub fn remove(&self, node: TestNode) {
        self.elements.write().remove(&node.0);
    }

    /// Move an element to new bounds (simulating drift).
    pub fn set_bounds(&self, node: TestNode, bounds: BoundingBox) {
        if let Some(element) = self.elements.write().get_mut(&node.0) {
            element.bounds = bounds;
        }
    }

    /// Overwrite an element's computed style.
    pub fn set_style(&self, node: TestNode, style: ComputedStyle) {
        if let Some(element) = self.elements.write().get_mut(&node.0) {
            element.style = style;
        }
    }

    /// Set the document's reported `readyState`.
    pub fn set_ready_state(&self, state: ReadyState) {
        *self.ready_state.write() = state;
    }

    /// Every event dispatched so far, in order, for assertions.
    #[must_use]
    pub fn dispatched_events(&self) -> Vec<(TestNode, String, EventInit)> {
        self.dispatched
            .read()
            .iter()
            .map(|(id, name, init)| (TestNode(*id), name.clone(), init.clone()))
            .collect()
    }

    fn matches_selector(element: &TestElement, selector: &str) -> bool {
        let selector = selector.trim();
        if let Some(id) = selector.strip_prefix('#') {
            return element.id.as_deref() == Some(id);
        }
        if let Some(class) = selector.strip_prefix('.') {
            return element.class.iter().any(|c| c == class);
        }
        if let Some(inner) = selector.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            if let Some((attr, value)) = inner.split_once('=') {
                let value = value.trim_matches('"').trim_matches('\'');
                let actual = match attr {
                    "data-testid" => element.test_id.as_deref(),
                    "aria-label" => element.aria_label.as_deref(),
                    "placeholder" => element.placeholder.as_deref(),
                    "name" => element.name.as_deref(),
                    _ => None,
                };
                return actual == Some(value);
            }
        }
        element.tag.eq_ignore_ascii_case(selector)
    }
}

#[async_trait]
impl DocumentView for TestDocument {
    type Node = TestNode;

    fn query(&self, selector: &str) -> Option<Self::Node> {
        self.elements
            .read()
            .iter()
            .find(|(_, el)| Self::matches_selector(el, selector))
            .map(|(id, _)| TestNode(*id))
    }

    fn query_all(&self, selector: &str) -> Vec<Self::Node> {
        self.elements
            .read()
            .iter()
            .filter(|(_, el)| Self::matches_selector(el, selector))
            .map(|(id, _)| TestNode(*id))
            .collect()
    }

    fn by_id(&self, id: &str) -> Option<Self::Node> {
        self.elements
            .read()
            .iter()
            .find(|(_, el)| el.id.as_deref() == Some(id))
            .map(|(node, _)| TestNode(*node))
    }

    fn by_name(&self, name: &str) -> Option<Self::Node> {
        self.elements
            .read()
            .iter()
            .find(|(_, el)| el.name.as_deref() == Some(name))
            .map(|(node, _)| TestNode(*node))
    }

    fn by_xpath(&self, _xpath: &str) -> Option<Self::Node> {
        None
    }

    fn element_from_point(&self, x: f64, y: f64) -> Option<Self::Node> {
        self.elements
            .read()
            .iter()
            .find(|(_, el)| {
                x >= el.bounds.x && x <= el.bounds.x + el.bounds.width && y >= el.bounds.y && y <= el.bounds.y + el.bounds.height
            })
            .map(|(node, _)| TestNode(*node))
    }

    fn computed_style(&self, node: &Self::Node) -> ComputedStyle {
        self.elements.read().get(&node.0).map(|el| el.style).unwrap_or(ComputedStyle {
            displayed: false,
            visible: false,
            opaque: false,
            pointer_events_none: true,
            disabled: true,
            hidden_input_proxy: false,
        })
    }

    fn bounding_rect(&self, node: &Self::Node) -> Option<BoundingBox> {
        self.elements.read().get(&node.0).map(|el| el.bounds)
    }

    fn dispatch(&self, node: &Self::Node, event_name: &str, init: EventInit) {
        self.dispatched.write().push((node.0, event_name.to_string(), init));
    }

    fn focus(&self, node: &Self::Node) -> bool {
        self.elements.read().contains_key(&node.0)
    }

    fn scroll_into_view(&self, _node: &Self::Node) {}

    async fn capture_viewport(&self) -> Option<Frame> {
        Some(Frame::solid(64, 64, [255, 255, 255, 255]))
    }

    async fn capture_region(&self, bounds: BoundingBox) -> Option<Frame> {
        Some(Frame::solid(bounds.width.max(1.0) as u32, bounds.height.max(1.0) as u32, [255, 255, 255, 255]))
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready_state.read()
    }

    fn tag_name(&self, node: &Self::Node) -> String {
        self.elements.read().get(&node.0).map(|el| el.tag.clone()).unwrap_or_default()
    }

    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String> {
        let elements = self.elements.read();
        let element = elements.get(&node.0)?;
        match name {
            "id" => element.id.clone(),
            "name" => element.name.clone(),
            "data-testid" => element.test_id.clone(),
            "aria-label" => element.aria_label.clone(),
            "role" => element.role.clone(),
            "placeholder" => element.placeholder.clone(),
            "class" => (!element.class.is_empty()).then(|| element.class.join(" ")),
            _ => None,
        }
    }

    fn text_content(&self, node: &Self::Node) -> Option<String> {
        self.elements.read().get(&node.0).and_then(|el| el.text.clone())
    }

    fn parent(&self, node: &Self::Node) -> Option<Self::Node> {
        self.elements.read().get(&node.0).and_then(|el| el.parent).map(TestNode)
    }

    fn children(&self, node: &Self::Node) -> Vec<Self::Node> {
        self.elements.read().get(&node.0).map(|el| el.children.iter().copied().map(TestNode).collect()).unwrap_or_default()
    }

    fn siblings(&self, node: &Self::Node) -> Vec<Self::Node> {
        let elements = self.elements.read();
        let Some(element) = elements.get(&node.0) else { return Vec::new() };
        let Some(parent_id) = element.parent else { return Vec::new() };
        elements
            .get(&parent_id)
            .map(|parent| parent.children.iter().copied().filter(|id| *id != node.0).map(TestNode).collect())
            .unwrap_or_default()
    }

    fn ancestor_chain(&self, node: &Self::Node) -> Vec<Self::Node> {
        let elements = self.elements.read();
        let mut chain = Vec::new();
        let mut current = elements.get(&node.0).and_then(|el| el.parent);
        while let Some(id) = current {
            chain.push(TestNode(id));
            current = elements.get(&id).and_then(|el| el.parent);
        }
        chain
    }

    fn set_native_value(&self, node: &Self::Node, value: &str) -> bool {
        if let Some(element) = self.elements.write().get_mut(&node.0) {
            element.value = Some(value.to_string());
            true
        } else {
            false
        }
    }
}

/// A scripted [`HealingProvider`] that returns a fixed outcome after an
/// optional artificial delay, for exercising timeout/cancellation paths.
pub struct ScriptedHealingProvider {
    kind: HealingProviderKind,
    outcome: HealResult,
    delay: std::time::Duration,
}

impl ScriptedHealingProvider {
    /// Construct a provider that always succeeds with `suggested_selector`.
    #[must_use]
    pub fn succeeding(kind: HealingProviderKind, suggested_selector: impl Into<String>, confidence: f64) -> Self {
        Self {
            kind,
            outcome: HealResult {
                success: true,
                suggested_selector: Some(suggested_selector.into()),
                confidence,
                provider: kind,
            },
            delay: std::time::Duration::ZERO,
        }
    }

    /// Construct a provider that always fails to produce a suggestion.
    #[must_use]
    pub fn failing(kind: HealingProviderKind) -> Self {
        Self {
            kind,
            outcome: HealResult { success: false, suggested_selector: None, confidence: 0.0, provider: kind },
            delay: std::time::Duration::ZERO,
        }
    }

    /// Delay the response by `delay`, useful for exercising timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl HealingProvider for ScriptedHealingProvider {
    async fn heal(&self, _step: &RecordedStep, _attempted_selectors: &[String], signal: CancellationToken) -> Result<HealResult, HealingProviderError> {
        if self.delay > std::time::Duration::ZERO {
            tokio::select! {
                () = tokio::time::sleep(self.delay) => {}
                () = signal.cancelled() => return Err(HealingProviderError::Cancelled),
            }
        }
        Ok(self.outcome.clone())
    }

    fn kind(&self) -> HealingProviderKind {
        self.kind
    }
}

/// A plain in-memory [`PatternStore`], for tests that only need
/// load/save round-tripping without debounce behavior.
#[derive(Default)]
pub struct InMemoryPatternStore {
    records: parking_lot::Mutex<Vec<HealingRecord>>,
}

#[async_trait]
impl PatternStore for InMemoryPatternStore {
    async fn load(&self) -> Result<Vec<HealingRecord>, StoreError> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &[HealingRecord]) -> Result<(), StoreError> {
        *self.records.lock() = records.to_vec();
        Ok(())
    }

    async fn record_success(&self, fingerprint: &str, healed_selector: &str, strategy: &str, confidence: f64) {
        self.records.lock().push(HealingRecord {
            original_fingerprint: fingerprint.to_string(),
            healed_selector: healed_selector.to_string(),
            strategy: strategy.to_string(),
            confidence,
            timestamp: 0,
            success: true,
        });
    }

    async fn lookup(&self, fingerprint: &str) -> Vec<HealingRecord> {
        self.records.lock().iter().filter(|r| r.original_fingerprint == fingerprint).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_resolves_by_id_and_class() {
        let document = TestDocument::new();
        let node = document.insert(
            TestElement { tag: "button".into(), id: Some("submit".into()), class: vec!["primary".into()], ..Default::default() },
            None,
        );
        assert_eq!(document.query("#submit"), Some(node));
        assert_eq!(document.query(".primary"), Some(node));
    }

    #[test]
    fn ancestor_chain_walks_to_root() {
        let document = TestDocument::new();
        let root = document.insert(TestElement { tag: "main".into(), ..Default::default() }, None);
        let child = document.insert(TestElement { tag: "button".into(), ..Default::default() }, Some(root));
        assert_eq!(document.ancestor_chain(&child), vec![root]);
    }

    #[tokio::test]
    async fn scripted_provider_honors_cancellation() {
        let provider = ScriptedHealingProvider::succeeding(HealingProviderKind::LocalVision, "#x", 0.8)
            .with_delay(std::time::Duration::from_secs(10));
        let token = CancellationToken::new();
        token.cancel();
        let step = RecordedStep {
            step_number: 1,
            event_kind: playback_types::EventKind::Click,
            value: None,
            descriptor: playback_types::Bundle {
                primary_selector: None,
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
                original_bounds: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                context_hint: playback_types::ContextHint::Generic,
                in_terminal: false,
                in_rich_text: false,
                in_chat: false,
                graph: playback_types::ElementGraph {
                    target: playback_types::ElementNode {
                        relationship: playback_types::RelationshipTag::Target,
                        tag_name: "button".into(),
                        id: None,
                        class_name: Vec::new(),
                        name: None,
                        aria_label: None,
                        role: None,
                        test_id: None,
                        bounds: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                        selector: String::new(),
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
            },
            recorded_screenshot: None,
            delay_ms: None,
            conditional: None,
        };
        let result = provider.heal(&step, &[], token).await;
        assert!(matches!(result, Err(HealingProviderError::Cancelled)));
    }
}
