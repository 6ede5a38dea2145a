//! Shared data model for the self-healing playback core.
//!
//! These types are plain data: every mutable lookup in the core produces
//! candidates to compare against a recorded [`Bundle`], never mutates it.
//! See the workspace `SPEC_FULL.md` §3 Data Model for the authoritative
//! description each type here implements.
#![warn(missing_docs)]

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// A rectangle in document coordinates (scroll-adjusted).
///
/// Invariant: `width >= 0.0` and `height >= 0.0`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge, in document coordinates.
    pub x: f64,
    /// Top edge, in document coordinates.
    pub y: f64,
    /// Width. Always non-negative.
    pub width: f64,
    /// Height. Always non-negative.
    pub height: f64,
}

impl BoundingBox {
    /// Construct a box, clamping negative width/height to zero.
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Center point of the box.
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Area of the box.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Euclidean distance between this box's center and `other`'s center.
    #[must_use]
    pub fn center_distance(&self, other: &BoundingBox) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Whether this box's center is within `radius` of `other`'s center.
    #[must_use]
    pub fn is_near(&self, other: &BoundingBox, radius: f64) -> bool {
        self.center_distance(other) <= radius
    }

    /// Fractional overlap area relative to the union of the two boxes
    /// (intersection-over-union), in `[0, 1]`.
    #[must_use]
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return 0.0;
        }
        let intersection = (right - left) * (bottom - top);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 { 0.0 } else { intersection / union }
    }

    /// Percentage area change from `self` (original) to `other` (current),
    /// signed: positive means `other` is larger.
    #[must_use]
    pub fn pct_area_change(&self, other: &BoundingBox) -> f64 {
        let base = self.area();
        if base <= f64::EPSILON {
            return if other.area() <= f64::EPSILON { 0.0 } else { 100.0 };
        }
        (other.area() - base) / base * 100.0
    }
}

/// The UI container class a target lives in, determining input semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextHint {
    /// A terminal / command surface: keys must reach an emulated buffer.
    Terminal,
    /// A rich-text editing surface (contenteditable-style region).
    RichTextSurface,
    /// A chat input surface, often implemented atop a rich-text surface.
    ChatSurface,
    /// No specific surface semantics; matches any.
    Generic,
}

impl Default for ContextHint {
    fn default() -> Self {
        Self::Generic
    }
}

/// Relationship tag attached to a node inside an [`ElementGraph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipTag {
    /// The recorded target itself.
    Target,
    /// An ancestor of the target.
    Parent,
    /// A sibling of the target.
    Sibling,
    /// A child of the target.
    Child,
    /// An element within the configured proximity radius.
    Nearby,
    /// A structural landmark (header/nav/main/footer/region/...).
    Landmark,
}

/// A single node captured in an [`ElementGraph`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementNode {
    /// How this node relates to the recorded target.
    pub relationship: RelationshipTag,
    /// Lowercase tag name (`button`, `div`, ...).
    pub tag_name: String,
    /// `id` attribute, if present.
    pub id: Option<String>,
    /// `class` attribute tokens.
    pub class_name: Vec<String>,
    /// `name` attribute, if present.
    pub name: Option<String>,
    /// `aria-label` attribute, if present.
    pub aria_label: Option<String>,
    /// ARIA `role`, if present.
    pub role: Option<String>,
    /// `data-testid` (or equivalent) attribute, if present.
    pub test_id: Option<String>,
    /// Recorded bounds for this node.
    pub bounds: BoundingBox,
    /// A selector string that should resolve this node independently.
    pub selector: String,
    /// Truncated immediate text content, when available.
    pub text: Option<String>,
    /// Hint that this node's identity is unlikely to change across drift
    /// (e.g. a `<main>` landmark versus an autogenerated wrapper `div`).
    pub is_stable: bool,
    /// Distance in document pixels from this node to the target. Only
    /// meaningful for [`RelationshipTag::Nearby`] nodes.
    pub distance_to_target: Option<f64>,
}

/// The relationship-graph snapshot captured alongside a [`Bundle`].
///
/// Invariant: a DAG rooted at `target`; `parents` runs from the immediate
/// parent to the root-most captured ancestor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementGraph {
    /// The recorded target node.
    pub target: ElementNode,
    /// Ancestors, nearest first.
    pub parents: Vec<ElementNode>,
    /// Sibling nodes.
    pub siblings: Vec<ElementNode>,
    /// Child nodes.
    pub children: Vec<ElementNode>,
    /// Nodes within the configured proximity radius.
    pub nearby: Vec<ElementNode>,
    /// Structural landmarks on the page at record time.
    pub landmarks: Vec<ElementNode>,
}

/// Identity and geometry captured for a recorded target. The recorder's
/// snapshot used to re-locate a target at playback time.
///
/// Invariant: immutable after recording. Every lookup yields candidates to
/// compare against a `Bundle`; nothing in this core mutates one in place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bundle {
    /// The canonical selector recorded at capture time.
    pub primary_selector: Option<String>,
    /// `id` attribute.
    pub id: Option<String>,
    /// `name` attribute.
    pub name: Option<String>,
    /// `data-testid` (or equivalent) attribute.
    pub test_id: Option<String>,
    /// `aria-label` attribute.
    pub aria_label: Option<String>,
    /// ARIA `role`.
    pub role: Option<String>,
    /// `placeholder` attribute, for inputs.
    pub placeholder: Option<String>,
    /// An XPath expression resolving the target at record time.
    pub xpath: Option<String>,
    /// Lowercase tag name.
    pub tag_name: String,
    /// Truncated immediate text content.
    pub text: Option<String>,
    /// `class` attribute tokens.
    pub class_tokens: Vec<String>,
    /// Bounds at record time.
    pub original_bounds: BoundingBox,
    /// The UI surface this target was recorded in.
    pub context_hint: ContextHint,
    /// Whether the target sits within a terminal surface.
    pub in_terminal: bool,
    /// Whether the target sits within a rich-text surface.
    pub in_rich_text: bool,
    /// Whether the target sits within a chat surface.
    pub in_chat: bool,
    /// The relationship graph captured alongside this target.
    pub graph: ElementGraph,
    /// Recorded screenshot region, base64-encoded, if captured.
    pub recorded_screenshot: Option<String>,
    /// Bounds of the recorded screenshot region.
    pub recorded_screenshot_bounds: Option<BoundingBox>,
    /// Recorded confidence that the visual context matched at record time.
    pub recorded_visual_context_confidence: Option<f64>,
}

/// The kind of interaction a [`RecordedStep`] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// Mouse/tap click.
    Click,
    /// Set the value of an input-like element.
    Input,
    /// Type literal text, character by character where required.
    Type,
    /// Dispatch a single key chord.
    Keypress,
    /// Change a `<select>`-like control's value.
    Select,
    /// Navigate to a URL.
    Navigate,
    /// Wait without interacting.
    Delay,
    /// A step gated on a runtime condition.
    Conditional,
}

/// Per-step override for a conditional step's evaluation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConditionalConfig {
    /// Selector whose presence gates execution of this step.
    pub condition_selector: Option<String>,
    /// If true, the step is skipped (not failed) when the condition is false.
    pub skip_if_absent: bool,
}

/// One step of a recorded interaction sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedStep {
    /// 1-based step number within the recording.
    pub step_number: u64,
    /// The kind of interaction to perform.
    pub event_kind: EventKind,
    /// Value to use for `Input`/`Type`/`Select` events.
    pub value: Option<String>,
    /// The recorded target descriptor.
    pub descriptor: Bundle,
    /// Recorded screenshot of the whole viewport at this step, if captured.
    pub recorded_screenshot: Option<String>,
    /// Per-step delay override, in milliseconds.
    pub delay_ms: Option<u64>,
    /// Conditional execution configuration, when `event_kind` is `Conditional`.
    pub conditional: Option<ConditionalConfig>,
}

/// Running status of a playback session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Actively executing steps.
    Running,
    /// Suspended; will resume from the current step index.
    Paused,
    /// All steps executed (successfully or not, subject to `stopOnError`).
    Completed,
    /// Halted due to `stopOnError` escalation.
    Failed,
    /// Halted by an explicit `abort()` call.
    Aborted,
}

/// Healing attempt counters for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingStats {
    /// Total healing attempts made (diagnostics run after a primary lookup miss).
    pub attempted: u64,
    /// Attempts that produced a usable resolution.
    pub successful: u64,
    /// Attempts that exhausted every resolution strategy.
    pub failed: u64,
    /// Attempts satisfied entirely from the pattern-store cache.
    pub cached: u64,
}

/// Per-session bookkeeping owned exclusively by the playback engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionState {
    /// Opaque session identifier.
    pub session_id: String,
    /// Owning project identifier.
    pub project_id: String,
    /// Index of the step about to execute (or last executed).
    pub current_step_index: usize,
    /// Total number of steps in this session's recording.
    pub total_steps: usize,
    /// Indices of steps that have completed (success or failure).
    pub steps_executed: Vec<usize>,
    /// Aggregate healing counters for this session.
    pub healing_stats: HealingStats,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Monotonic instant the session started, for duration accounting.
    #[serde(skip, default = "Instant::now")]
    pub start_time: Instant,
    /// Reason supplied to the most recent `pause()` call, if paused.
    pub pause_reason: Option<String>,
}

impl SessionState {
    /// Construct fresh bookkeeping for a new session over `total_steps`.
    #[must_use]
    pub fn new(session_id: impl Into<String>, project_id: impl Into<String>, total_steps: usize) -> Self {
        Self {
            session_id: session_id.into(),
            project_id: project_id.into(),
            current_step_index: 0,
            total_steps,
            steps_executed: Vec::new(),
            healing_stats: HealingStats::default(),
            status: SessionStatus::Running,
            start_time: Instant::now(),
            pause_reason: None,
        }
    }

    /// Elapsed wall-clock time since the session started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// Per-axis evidence contributions recorded for a [`Candidate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBreakdown {
    /// Spatial proximity/overlap score, `[0, 1]`.
    pub spatial: f64,
    /// Sequence-plausibility score, `[0, 1]`.
    pub sequence: f64,
    /// Visual similarity score, `[0, 1]`.
    pub visual: f64,
    /// DOM identity-attribute agreement score, `[0, 1]`.
    pub dom: f64,
    /// Historical healing-success score, `[0, 1]`.
    pub history: f64,
}

/// A scored candidate element produced by the Evidence Aggregator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate<E> {
    /// The candidate element (opaque to this crate; supplied by a `DocumentView`).
    pub element: E,
    /// A selector string that resolves this candidate.
    pub selector: String,
    /// Score contributed by each evidence axis.
    pub evidence: EvidenceBreakdown,
    /// Weighted total score in `[0, 1]`.
    pub total_score: f64,
}

/// A persisted record of a successful non-primary resolution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealingRecord {
    /// Stable hash of the original descriptor's identity fields.
    pub original_fingerprint: String,
    /// The selector the healing strategy resolved to.
    pub healed_selector: String,
    /// Name of the resolution strategy that produced this healing.
    pub strategy: String,
    /// Confidence reported by the strategy, `[0, 1]`.
    pub confidence: f64,
    /// Unix timestamp (seconds) the healing was recorded.
    pub timestamp: u64,
    /// Whether the healed selector was later confirmed to work.
    pub success: bool,
}

/// Compute the stable fingerprint scheme described in §6: a hash over
/// `(tagName, testId, id, name, ariaLabel, role, normalized text prefix)`.
#[must_use]
pub fn descriptor_fingerprint(descriptor: &Bundle) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    descriptor.tag_name.hash(&mut hasher);
    descriptor.test_id.hash(&mut hasher);
    descriptor.id.hash(&mut hasher);
    descriptor.name.hash(&mut hasher);
    descriptor.aria_label.hash(&mut hasher);
    descriptor.role.hash(&mut hasher);
    let normalized_text: String = descriptor
        .text
        .as_deref()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
        .chars()
        .take(64)
        .collect();
    normalized_text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Normalized token-overlap similarity between two strings, `[0, 1]`.
///
/// Splits on non-alphanumeric boundaries, lowercases, and compares token
/// sets with the Jaccard index. Used wherever a recorded string and a
/// live candidate's text need a "text similarity" score.
#[must_use]
pub fn text_similarity(a: &str, b: &str) -> f64 {
    fn tokens(s: &str) -> std::collections::BTreeSet<String> {
        s.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
    let a = a.trim();
    let b = b.trim();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.eq_ignore_ascii_case(b) {
        return 1.0;
    }
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return if a.eq_ignore_ascii_case(b) { 1.0 } else { 0.0 };
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Errors common to data validation across the playback core.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// Evidence weight vector did not sum to 1.0 within tolerance.
    #[error("evidence weights must sum to 1.0, got {sum}")]
    WeightsNotNormalized {
        /// The observed (incorrect) sum.
        sum: f64,
    },
}
