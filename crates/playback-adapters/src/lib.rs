//! External collaborator traits consumed by the playback core.
//!
//! Per §1/§6 of `SPEC_FULL.md`, the core treats the rendered document, any
//! vision/AI healing backend, and the healing-cache persistence layer as
//! opaque adapters. Nothing here renders UI, records steps, or owns a
//! specific automation technology; that is all out of scope.
#![warn(missing_docs)]

use async_trait::async_trait;
use playback_types::{BoundingBox, HealingRecord, RecordedStep};
use tokio_util::sync::CancellationToken;

/// Pixel buffer captured by a [`DocumentView`], owned by the capture layer
/// and borrowed by the comparator. See §9 Design Notes: "prefer a
/// `Frame{pixels, width, height, format}` value type" over base64 blobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Raw pixel data, `width * height * 4` bytes, RGBA8 row-major.
    pub pixels: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Frame {
    /// Construct a new frame, panicking if `pixels` doesn't match `width * height * 4`.
    #[must_use]
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        assert_eq!(
            pixels.len(),
            width as usize * height as usize * 4,
            "pixel buffer length must equal width * height * 4"
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Construct a solid-color frame of the given size. Useful for tests
    /// and as a placeholder when capture fails.
    #[must_use]
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&rgba);
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Fetch the RGBA pixel at `(x, y)`, or `None` if out of bounds.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels
            .get(idx..idx + 4)
            .map(|s| [s[0], s[1], s[2], s[3]])
    }

    /// Extract the sub-region described by `bounds` (document coordinates,
    /// assumed to already be relative to this frame's origin), clamped to
    /// the frame's extent, with `padding` pixels added on each side.
    #[must_use]
    pub fn extract_region(&self, bounds: BoundingBox, padding: f64) -> Frame {
        let x0 = ((bounds.x - padding).max(0.0)) as u32;
        let y0 = ((bounds.y - padding).max(0.0)) as u32;
        let x1 = ((bounds.x + bounds.width + padding).min(self.width as f64)) as u32;
        let y1 = ((bounds.y + bounds.height + padding).min(self.height as f64)) as u32;
        let w = x1.saturating_sub(x0).max(1);
        let h = y1.saturating_sub(y0).max(1);
        let mut pixels = Vec::with_capacity(w as usize * h as usize * 4);
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let px = self.pixel(x, y).unwrap_or([0, 0, 0, 0]);
                pixels.extend_from_slice(&px);
            }
        }
        Frame {
            pixels,
            width: w,
            height: h,
        }
    }
}

/// Computed visual style bits relevant to interactability and visibility.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComputedStyle {
    /// `display` is not `none`.
    pub displayed: bool,
    /// `visibility` is not `hidden`/`collapse`.
    pub visible: bool,
    /// Effective opacity is above a visible threshold.
    pub opaque: bool,
    /// The element (or an ancestor) has `pointer-events: none`.
    pub pointer_events_none: bool,
    /// The element is `disabled`.
    pub disabled: bool,
    /// Whether the element is a known off-screen input proxy intentionally
    /// hidden by a surface that renders its own content (§4.6 visibility
    /// exception).
    pub hidden_input_proxy: bool,
}

impl ComputedStyle {
    /// Whether the element renders at all (ignoring the hidden-proxy exception).
    #[must_use]
    pub fn renders(&self) -> bool {
        self.displayed && self.visible && self.opaque
    }

    /// Whether the element is usable for dispatching interaction events,
    /// honoring the hidden-input-proxy exception from §4.6.
    #[must_use]
    pub fn is_interactable_visibility(&self) -> bool {
        (self.renders() || self.hidden_input_proxy) && !self.disabled
    }
}

/// Document readiness, mirrored from the standard `document.readyState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyState {
    /// Still loading.
    Loading,
    /// DOM built but subresources may still be loading.
    Interactive,
    /// Fully loaded.
    Complete,
}

/// Parameters for a dispatched synthetic event.
#[derive(Clone, Debug, Default)]
pub struct EventInit {
    /// Client-space X, for pointer events.
    pub client_x: Option<f64>,
    /// Client-space Y, for pointer events.
    pub client_y: Option<f64>,
    /// `key` value, for keyboard events.
    pub key: Option<String>,
    /// `code` value, for keyboard events.
    pub code: Option<String>,
    /// `data` value, for `input` events.
    pub data: Option<String>,
    /// `inputType` value, for `input` events.
    pub input_type: Option<String>,
}

/// Unified adapter over a mutable rendered document.
///
/// All reads/writes the core performs go through this trait; it is the only
/// seam touching a concrete automation technology. Implementations may wrap
/// a real browser/accessibility tree, or (see `playback-testkit`) a
/// synthetic in-memory document for deterministic tests.
#[async_trait]
pub trait DocumentView: Send + Sync {
    /// Opaque node handle. Cheap to clone; equality is identity.
    type Node: Clone + Send + Sync + std::fmt::Debug + PartialEq + 'static;

    /// Resolve a CSS-like selector to its first match.
    fn query(&self, selector: &str) -> Option<Self::Node>;
    /// Resolve a CSS-like selector to every match.
    fn query_all(&self, selector: &str) -> Vec<Self::Node>;
    /// Resolve by `id` attribute.
    fn by_id(&self, id: &str) -> Option<Self::Node>;
    /// Resolve by `name` attribute.
    fn by_name(&self, name: &str) -> Option<Self::Node>;
    /// Resolve an XPath expression.
    fn by_xpath(&self, xpath: &str) -> Option<Self::Node>;
    /// Hit-test a document-coordinate point.
    fn element_from_point(&self, x: f64, y: f64) -> Option<Self::Node>;
    /// Fetch visibility/interactability-relevant computed style.
    fn computed_style(&self, node: &Self::Node) -> ComputedStyle;
    /// Fetch the node's bounding rect, if it has layout.
    fn bounding_rect(&self, node: &Self::Node) -> Option<BoundingBox>;
    /// Convenience: `computed_style(node).is_interactable_visibility()`.
    fn is_visible(&self, node: &Self::Node) -> bool {
        self.computed_style(node).is_interactable_visibility()
    }
    /// Dispatch a synthetic event at `node`.
    fn dispatch(&self, node: &Self::Node, event_name: &str, init: EventInit);
    /// Focus `node`. Returns whether focus was actually acquired.
    fn focus(&self, node: &Self::Node) -> bool;
    /// Scroll `node` into the viewport.
    fn scroll_into_view(&self, node: &Self::Node);
    /// Capture the full viewport.
    async fn capture_viewport(&self) -> Option<Frame>;
    /// Capture a specific document-coordinate region.
    async fn capture_region(&self, bounds: BoundingBox) -> Option<Frame>;
    /// Document readiness.
    fn ready_state(&self) -> ReadyState;
    /// Lowercase tag name of `node`.
    fn tag_name(&self, node: &Self::Node) -> String;
    /// Fetch a named attribute's value.
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    /// Immediate text content, untruncated.
    fn text_content(&self, node: &Self::Node) -> Option<String>;
    /// Parent node, if any.
    fn parent(&self, node: &Self::Node) -> Option<Self::Node>;
    /// Direct children.
    fn children(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// Sibling nodes (not including `node` itself).
    fn siblings(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// Ancestor chain from immediate parent to document root.
    fn ancestor_chain(&self, node: &Self::Node) -> Vec<Self::Node>;
    /// Assign an input-like node's value through the underlying native
    /// property setter, bypassing framework wrappers. Returns whether the
    /// assignment was accepted.
    fn set_native_value(&self, node: &Self::Node, value: &str) -> bool;
}

/// Outcome of a [`HealingProvider::heal`] call.
#[derive(Clone, Debug)]
pub struct HealResult {
    /// Whether a usable selector was produced.
    pub success: bool,
    /// The suggested selector, when `success`.
    pub suggested_selector: Option<String>,
    /// Confidence in the suggestion, `[0, 1]`.
    pub confidence: f64,
    /// Which provider produced this result.
    pub provider: HealingProviderKind,
}

/// Which healing backend produced a [`HealResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealingProviderKind {
    /// An on-device vision model.
    LocalVision,
    /// A remote AI vision service.
    AiVision,
}

/// Errors a [`HealingProvider`] may surface. Per §7, these never cross the
/// engine boundary as exceptions: callers fold them into a failed attempt
/// and try the next resolution strategy.
#[derive(Debug, thiserror::Error)]
pub enum HealingProviderError {
    /// The call was cancelled via the supplied token before completing.
    #[error("healing provider call was cancelled")]
    Cancelled,
    /// The call exceeded its allotted time.
    #[error("healing provider call timed out")]
    Timeout,
    /// The provider is disabled by configuration.
    #[error("healing provider is disabled")]
    Disabled,
    /// Backend-specific failure.
    #[error("healing provider error: {0}")]
    Backend(String),
}

/// Optional vision/AI fallback consulted by the Troubleshooter's last two
/// resolution strategies. Either provider may be disabled by configuration;
/// callers must tolerate its absence.
#[async_trait]
pub trait HealingProvider: Send + Sync {
    /// Attempt to diagnose and heal a failed step.
    ///
    /// Implementations must honor `signal`: once cancelled, they should
    /// return `Err(HealingProviderError::Cancelled)` promptly rather than
    /// run to completion.
    async fn heal(
        &self,
        step: &RecordedStep,
        attempted_selectors: &[String],
        signal: CancellationToken,
    ) -> Result<HealResult, HealingProviderError>;

    /// Which provider this is, for attempt bookkeeping when not yet called.
    fn kind(&self) -> HealingProviderKind;
}

/// Errors returned by a [`PatternStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing medium could not be read.
    #[error("pattern store read failed: {0}")]
    Read(String),
    /// The backing medium could not be written.
    #[error("pattern store write failed: {0}")]
    Write(String),
    /// Stored data failed to deserialize.
    #[error("pattern store data is corrupt: {0}")]
    Corrupt(String),
}

/// Healing-cache persistence adapter. The only process-wide mutable
/// resource in this core (§5): concurrent writers are not supported, and
/// implementations should serialize through a single in-flight save.
#[async_trait]
pub trait PatternStore: Send + Sync {
    /// Load all persisted healing records.
    async fn load(&self) -> Result<Vec<HealingRecord>, StoreError>;
    /// Persist the given record set, replacing prior contents.
    async fn save(&self, records: &[HealingRecord]) -> Result<(), StoreError>;
    /// Record a successful (or attempted) healing for later lookup.
    async fn record_success(
        &self,
        fingerprint: &str,
        healed_selector: &str,
        strategy: &str,
        confidence: f64,
    );
    /// Look up prior healings for a descriptor fingerprint.
    async fn lookup(&self, fingerprint: &str) -> Vec<HealingRecord>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_solid_round_trips_pixel() {
        let f = Frame::solid(4, 4, [10, 20, 30, 255]);
        assert_eq!(f.pixel(1, 1), Some([10, 20, 30, 255]));
        assert_eq!(f.pixel(10, 10), None);
    }

    #[test]
    fn extract_region_respects_padding_and_bounds() {
        let f = Frame::solid(100, 100, [1, 2, 3, 4]);
        let region = f.extract_region(BoundingBox::new(10.0, 10.0, 20.0, 20.0), 5.0);
        assert_eq!(region.width, 30);
        assert_eq!(region.height, 30);
    }

    #[test]
    fn computed_style_hidden_proxy_exception() {
        let mut style = ComputedStyle::default();
        assert!(!style.is_interactable_visibility());
        style.hidden_input_proxy = true;
        assert!(style.is_interactable_visibility());
        style.disabled = true;
        assert!(!style.is_interactable_visibility());
    }
}
