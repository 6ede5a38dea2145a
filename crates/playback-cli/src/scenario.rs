//! RON scenario format: a starting document snapshot plus the recorded
//! steps to replay against it, driving [`playback_testkit::TestDocument`]
//! the way a real recorder+backend pair would drive a live one.

use playback_adapters::ComputedStyle;
use playback_testkit::{TestDocument, TestElement, TestNode};
use playback_types::{BoundingBox, RecordedStep};
use serde::Deserialize;

/// One synthetic element to seed into the scenario's starting document.
#[derive(Clone, Debug, Deserialize)]
pub struct ElementSpec {
    /// Lowercase tag name.
    pub tag: String,
    /// `id` attribute.
    #[serde(default)]
    pub id: Option<String>,
    /// `name` attribute.
    #[serde(default)]
    pub name: Option<String>,
    /// `data-testid` attribute.
    #[serde(default)]
    pub test_id: Option<String>,
    /// `aria-label` attribute.
    #[serde(default)]
    pub aria_label: Option<String>,
    /// `role` attribute.
    #[serde(default)]
    pub role: Option<String>,
    /// `placeholder` attribute.
    #[serde(default)]
    pub placeholder: Option<String>,
    /// `class` attribute tokens.
    #[serde(default)]
    pub class: Vec<String>,
    /// Text content.
    #[serde(default)]
    pub text: Option<String>,
    /// Document-coordinate bounds.
    pub bounds: BoundingBox,
    /// Whether the element renders (maps to `ComputedStyle::{displayed,visible,opaque}`).
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Whether the element is disabled.
    #[serde(default)]
    pub disabled: bool,
    /// Index into this scenario's `elements` list of this element's
    /// parent, if any. Must refer to an earlier entry.
    #[serde(default)]
    pub parent: Option<usize>,
}

const fn default_true() -> bool {
    true
}

impl ElementSpec {
    fn into_test_element(self) -> TestElement {
        TestElement {
            tag: self.tag,
            id: self.id,
            name: self.name,
            test_id: self.test_id,
            aria_label: self.aria_label,
            role: self.role,
            placeholder: self.placeholder,
            class: self.class,
            text: self.text,
            bounds: self.bounds,
            style: ComputedStyle {
                displayed: self.visible,
                visible: self.visible,
                opaque: self.visible,
                pointer_events_none: false,
                disabled: self.disabled,
                hidden_input_proxy: false,
            },
            value: None,
            ..TestElement::default()
        }
    }
}

/// A full scenario: the document to seed and the steps to replay against it.
#[derive(Clone, Debug, Deserialize)]
pub struct Scenario {
    /// Elements to insert, parents before children.
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    /// The recorded steps to replay, in order.
    pub steps: Vec<RecordedStep>,
}

impl Scenario {
    /// Parse a RON-encoded scenario.
    pub fn parse(contents: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(contents)
    }

    /// Build a fresh [`TestDocument`] seeded with this scenario's elements.
    ///
    /// # Panics
    /// Panics if an [`ElementSpec::parent`] index is out of range or
    /// refers to an element not yet inserted (i.e. a forward reference).
    #[must_use]
    pub fn build_document(&self) -> TestDocument {
        let document = TestDocument::new();
        let mut inserted: Vec<TestNode> = Vec::with_capacity(self.elements.len());
        for spec in &self.elements {
            let parent = spec.parent.map(|index| {
                *inserted
                    .get(index)
                    .unwrap_or_else(|| panic!("scenario element parent index {index} is out of range or forward-referenced"))
            });
            let node = document.insert(spec.clone().into_test_element(), parent);
            inserted.push(node);
        }
        document
    }
}
