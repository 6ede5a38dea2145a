//! Action Executor (C7).
//!
//! Dispatches click/type/key interactions against a [`DocumentView`] with
//! surface-appropriate semantics: native inputs get their value assigned
//! through the underlying setter, rich-text regions get an insertion
//! command where possible, terminal surfaces only ever see synthetic key
//! and input events. See `SPEC_FULL.md` §4.7.
#![warn(missing_docs)]

use std::time::Duration;

use playback_adapters::{DocumentView, EventInit};
use playback_types::Bundle;
use rand::Rng;

/// Errors the Action Executor can report. Per §7, an event-dispatch
/// failure on anything but the first input event is logged and the
/// sequence continues; only these conditions abort the whole action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The target could not acquire focus.
    #[error("could not acquire focus on the target element")]
    FocusFailed,
    /// The surface rejected the first input event of the sequence.
    #[error("surface rejected the first input event")]
    FirstInputRejected,
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, ActionError>;

/// Timing and jitter tuning for dispatched event sequences.
#[derive(Clone, Copy, Debug)]
pub struct ActionConfig {
    /// Minimum sleep (ms) between micro-events within a single interaction.
    pub micro_event_min_ms: u64,
    /// Maximum sleep (ms) between micro-events within a single interaction.
    pub micro_event_max_ms: u64,
    /// Whether "human-like" mode is enabled: adds per-character jitter.
    pub human_like: bool,
    /// Minimum extra jitter (ms) between characters in human-like mode.
    pub human_jitter_min_ms: u64,
    /// Maximum extra jitter (ms) between characters in human-like mode.
    pub human_jitter_max_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            micro_event_min_ms: 20,
            micro_event_max_ms: 50,
            human_like: false,
            human_jitter_min_ms: 30,
            human_jitter_max_ms: 80,
        }
    }
}

async fn micro_sleep(cfg: ActionConfig) {
    let millis = rand::thread_rng().gen_range(cfg.micro_event_min_ms..=cfg.micro_event_max_ms);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

async fn human_jitter(cfg: ActionConfig) {
    if cfg.human_like {
        let millis = rand::thread_rng().gen_range(cfg.human_jitter_min_ms..=cfg.human_jitter_max_ms);
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// Click `node`: scroll into view, focus, then `mouseover → mousedown →
/// mouseup → click` at the element's center with a small randomized
/// offset.
pub async fn click<D: DocumentView>(document: &D, node: &D::Node, cfg: ActionConfig) -> Result<()> {
    document.scroll_into_view(node);
    if !document.focus(node) {
        return Err(ActionError::FocusFailed);
    }

    let (cx, cy) = document
        .bounding_rect(node)
        .map(|b| b.center())
        .unwrap_or((0.0, 0.0));
    let mut rng = rand::thread_rng();
    let jitter_x = rng.gen_range(-2.0..=2.0);
    let jitter_y = rng.gen_range(-2.0..=2.0);
    let init = EventInit {
        client_x: Some(cx + jitter_x),
        client_y: Some(cy + jitter_y),
        ..Default::default()
    };

    for event_name in ["mouseover", "mousedown", "mouseup", "click"] {
        document.dispatch(node, event_name, init.clone());
        micro_sleep(cfg).await;
    }
    Ok(())
}

fn key_init(ch: char) -> EventInit {
    EventInit {
        key: Some(ch.to_string()),
        code: Some(format!("Key{}", ch.to_ascii_uppercase())),
        data: Some(ch.to_string()),
        ..Default::default()
    }
}

async fn dispatch_char_sequence<D: DocumentView>(document: &D, node: &D::Node, ch: char, cfg: ActionConfig) {
    let init = key_init(ch);
    document.dispatch(node, "keydown", init.clone());
    document.dispatch(
        node,
        "input",
        EventInit {
            data: Some(ch.to_string()),
            input_type: Some("insertText".to_string()),
            ..Default::default()
        },
    );
    document.dispatch(node, "keyup", init);
    human_jitter(cfg).await;
}

/// Type `value` into `node`, dispatching with semantics appropriate to the
/// descriptor's recorded surface.
pub async fn type_text<D: DocumentView>(
    document: &D,
    node: &D::Node,
    value: &str,
    descriptor: &Bundle,
    cfg: ActionConfig,
) -> Result<()> {
    if !document.focus(node) {
        return Err(ActionError::FocusFailed);
    }

    if descriptor.in_terminal {
        for (i, ch) in value.chars().enumerate() {
            dispatch_char_sequence(document, node, ch, cfg).await;
            if i == 0 && !document.is_visible(node) {
                return Err(ActionError::FirstInputRejected);
            }
        }
        return Ok(());
    }

    let tag = document.tag_name(node);
    if tag == "input" || tag == "textarea" {
        document.set_native_value(node, "");
        let accepted = document.set_native_value(node, value);
        if !accepted {
            return Err(ActionError::FirstInputRejected);
        }
        document.dispatch(node, "input", EventInit {
            data: Some(value.to_string()),
            ..Default::default()
        });
        document.dispatch(node, "change", EventInit::default());
        return Ok(());
    }

    if descriptor.in_rich_text || descriptor.in_chat {
        let accepted = document.set_native_value(node, value);
        document.dispatch(
            node,
            "input",
            EventInit {
                data: Some(value.to_string()),
                input_type: Some("insertText".to_string()),
                ..Default::default()
            },
        );
        if !accepted {
            for (i, ch) in value.chars().enumerate() {
                dispatch_char_sequence(document, node, ch, cfg).await;
                if i == 0 && !document.is_visible(node) {
                    return Err(ActionError::FirstInputRejected);
                }
            }
        }
        return Ok(());
    }

    for (i, ch) in value.chars().enumerate() {
        dispatch_char_sequence(document, node, ch, cfg).await;
        if i == 0 && !document.is_visible(node) {
            return Err(ActionError::FirstInputRejected);
        }
    }
    Ok(())
}

/// Emit an Enter key sequence, with the terminal-specific trailing
/// `input{data:'\r'}` event when the descriptor is recorded in a terminal
/// surface.
pub async fn press_enter<D: DocumentView>(document: &D, node: &D::Node, descriptor: &Bundle, cfg: ActionConfig) -> Result<()> {
    let init = EventInit {
        key: Some("Enter".to_string()),
        code: Some("Enter".to_string()),
        ..Default::default()
    };
    document.dispatch(node, "keydown", init.clone());
    micro_sleep(cfg).await;
    document.dispatch(node, "keypress", init.clone());
    micro_sleep(cfg).await;
    document.dispatch(node, "keyup", init);

    if descriptor.in_terminal {
        document.dispatch(
            node,
            "input",
            EventInit {
                data: Some("\r".to_string()),
                input_type: Some("insertLineBreak".to_string()),
                ..Default::default()
            },
        );
    }
    Ok(())
}

/// Emit a `keydown`/`keyup` pair for an arbitrary named key.
pub async fn press_key<D: DocumentView>(document: &D, node: &D::Node, key: &str, cfg: ActionConfig) -> Result<()> {
    let init = EventInit {
        key: Some(key.to_string()),
        code: Some(key.to_string()),
        ..Default::default()
    };
    document.dispatch(node, "keydown", init.clone());
    micro_sleep(cfg).await;
    document.dispatch(node, "keyup", init);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use playback_adapters::{ComputedStyle, Frame, ReadyState};
    use playback_types::{BoundingBox, ElementGraph, ElementNode, RelationshipTag};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    struct NodeId(u32);

    #[derive(Default)]
    struct RecordedDocument {
        events: Mutex<Vec<(String, EventInit)>>,
        focus_ok: bool,
        native_value_ok: bool,
        tag: String,
    }

    #[async_trait::async_trait]
    impl DocumentView for RecordedDocument {
        type Node = NodeId;
        fn query(&self, _selector: &str) -> Option<Self::Node> {
            None
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
        fn computed_style(&self, _node: &Self::Node) -> ComputedStyle {
            ComputedStyle {
                displayed: true,
                visible: true,
                opaque: true,
                pointer_events_none: false,
                disabled: false,
                hidden_input_proxy: false,
            }
        }
        fn bounding_rect(&self, _node: &Self::Node) -> Option<BoundingBox> {
            Some(BoundingBox::new(0.0, 0.0, 100.0, 40.0))
        }
        fn dispatch(&self, _node: &Self::Node, event_name: &str, init: EventInit) {
            self.events.lock().unwrap().push((event_name.to_string(), init));
        }
        fn focus(&self, _node: &Self::Node) -> bool {
            self.focus_ok
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
        fn tag_name(&self, _node: &Self::Node) -> String {
            self.tag.clone()
        }
        fn attribute(&self, _node: &Self::Node, _name: &str) -> Option<String> {
            None
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
            self.native_value_ok
        }
    }

    fn descriptor(in_terminal: bool) -> Bundle {
        let bounds = BoundingBox::new(0.0, 0.0, 100.0, 40.0);
        Bundle {
            primary_selector: Some("#field".into()),
            id: None,
            name: None,
            test_id: None,
            aria_label: None,
            role: None,
            placeholder: None,
            xpath: None,
            tag_name: "input".into(),
            text: None,
            class_tokens: Vec::new(),
            original_bounds: bounds,
            context_hint: playback_types::ContextHint::Generic,
            in_terminal,
            in_rich_text: false,
            in_chat: false,
            graph: ElementGraph {
                target: ElementNode {
                    relationship: RelationshipTag::Target,
                    tag_name: "input".into(),
                    id: None,
                    class_name: Vec::new(),
                    name: None,
                    aria_label: None,
                    role: None,
                    test_id: None,
                    bounds,
                    selector: "#field".into(),
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

    #[tokio::test]
    async fn click_emits_four_phase_sequence() {
        let document = RecordedDocument { focus_ok: true, ..Default::default() };
        click(&document, &NodeId(1), ActionConfig::default()).await.unwrap();
        let events = document.events.lock().unwrap();
        let names: Vec<_> = events.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["mouseover", "mousedown", "mouseup", "click"]);
    }

    #[tokio::test]
    async fn click_fails_when_focus_cannot_be_acquired() {
        let document = RecordedDocument { focus_ok: false, ..Default::default() };
        let result = click(&document, &NodeId(1), ActionConfig::default()).await;
        assert!(matches!(result, Err(ActionError::FocusFailed)));
    }

    #[tokio::test]
    async fn type_text_uses_native_setter_for_inputs() {
        let document = RecordedDocument {
            focus_ok: true,
            native_value_ok: true,
            tag: "input".to_string(),
            ..Default::default()
        };
        type_text(&document, &NodeId(1), "hi", &descriptor(false), ActionConfig::default())
            .await
            .unwrap();
        let events = document.events.lock().unwrap();
        assert!(events.iter().any(|(n, _)| n == "change"));
    }

    #[tokio::test]
    async fn type_text_uses_per_character_events_on_terminal_surface() {
        let document = RecordedDocument {
            focus_ok: true,
            tag: "div".to_string(),
            ..Default::default()
        };
        type_text(&document, &NodeId(1), "ls", &descriptor(true), ActionConfig::default())
            .await
            .unwrap();
        let events = document.events.lock().unwrap();
        let keydowns = events.iter().filter(|(n, _)| n == "keydown").count();
        assert_eq!(keydowns, 2);
    }

    #[tokio::test]
    async fn press_enter_emits_terminal_line_break_event() {
        let document = RecordedDocument { focus_ok: true, ..Default::default() };
        press_enter(&document, &NodeId(1), &descriptor(true), ActionConfig::default())
            .await
            .unwrap();
        let events = document.events.lock().unwrap();
        assert!(events.iter().any(|(n, init)| n == "input" && init.data.as_deref() == Some("\r")));
    }
}
