//! Playback Engine (C9): per-step orchestration, session bookkeeping, and
//! event emission for the self-healing playback core.
//!
//! [`PlaybackEngine`] is the crate's single entry point. It owns the two
//! process-wide resources described in `SPEC_FULL.md` §5 — the Pattern
//! Store cache actor and the optional healing-provider handles — and
//! spawns one independent session actor per [`PlaybackEngine::start_session`]
//! call. Sessions share this engine's pattern cache and aggregate healing
//! counters but never share mutable state with each other.
//!
//! Everything else in this crate (Element Finder, Drift Detector, Graph
//! Finder, Evidence Aggregator, Screenshot Comparator, Troubleshooter,
//! Action Executor, Delay Manager, Pattern Store) lives in its own crate;
//! this one wires them together behind the per-step algorithm in §4.9.
#![warn(missing_docs)]

mod candidates;
pub mod config;
mod error;
pub mod events;
pub mod screenshots;
mod session;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use playback_adapters::{DocumentView, HealingProvider, PatternStore};
use playback_store::PatternCacheConfig;
use playback_types::RecordedStep;

pub use config::EngineConfig;
pub use error::PlaybackError;
pub use events::{EngineStatus, SessionEvent, StepExecutionResult};
pub use screenshots::{decode_frame_b64, encode_frame_b64};
pub use session::SessionHandle;

/// Entry point for the self-healing playback core.
///
/// Construct once per process (or per test), then call
/// [`start_session`](Self::start_session) for each recording to replay.
/// Multiple sessions may run concurrently; each advances independently,
/// cooperatively scheduled (`SPEC_FULL.md` §5), and reports through its
/// own [`SessionHandle`].
pub struct PlaybackEngine {
    config: EngineConfig,
    pattern_cache: playback_store::PatternCacheHandle,
    local_vision: Option<Arc<dyn HealingProvider + Sync>>,
    ai_vision: Option<Arc<dyn HealingProvider + Sync>>,
    aggregate: Arc<session::EngineAggregate>,
    sessions_running: Arc<AtomicUsize>,
}

impl PlaybackEngine {
    /// Construct an engine, loading the healing cache from `pattern_store`.
    ///
    /// # Errors
    /// Returns [`PlaybackError::InvalidEvidenceWeights`] if
    /// `config.evidence.weights` do not sum to 1.0 (+/- 1e-6). This is the
    /// only construction-time check the core performs (§9: "only truly
    /// exceptional states ... throw, and only at construction").
    pub async fn new(
        config: EngineConfig,
        pattern_store: Arc<dyn PatternStore>,
        cache_config: PatternCacheConfig,
        local_vision: Option<Arc<dyn HealingProvider + Sync>>,
        ai_vision: Option<Arc<dyn HealingProvider + Sync>>,
    ) -> Result<Self, PlaybackError> {
        config
            .evidence
            .weights
            .validated()
            .map_err(PlaybackError::InvalidEvidenceWeights)?;
        let pattern_cache = playback_store::spawn(pattern_store, cache_config).await;
        Ok(Self {
            config,
            pattern_cache,
            local_vision,
            ai_vision,
            aggregate: Arc::new(session::EngineAggregate::default()),
            sessions_running: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Begin replaying `steps` against `document`. Returns immediately with
    /// a [`SessionHandle`] driving a freshly spawned session actor; the
    /// first [`SessionEvent::StepStart`] follows once the actor's delay and
    /// pause checks clear.
    pub fn start_session<D: DocumentView + 'static>(
        &self,
        document: Arc<D>,
        session_id: impl Into<String>,
        project_id: impl Into<String>,
        steps: Vec<RecordedStep>,
    ) -> SessionHandle {
        session::spawn(
            document,
            session_id,
            project_id,
            steps,
            self.config.clone(),
            self.pattern_cache.clone(),
            self.local_vision.clone(),
            self.ai_vision.clone(),
            self.aggregate.clone(),
            self.sessions_running.clone(),
        )
    }

    /// Point-in-time status across every session this engine has spawned.
    pub async fn status(&self) -> EngineStatus {
        let (healing_stats, last_step_duration) = self.aggregate.snapshot();
        EngineStatus {
            sessions_running: self.sessions_running.load(Ordering::Acquire),
            last_step_duration,
            healing_stats,
            cache_size: self.pattern_cache.len().await,
        }
    }

    /// The configuration this engine was constructed with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use playback_testkit::{InMemoryPatternStore, TestDocument, TestElement};
    use playback_types::{Bundle, BoundingBox, ContextHint, ElementGraph, ElementNode, EventKind, RelationshipTag};

    use super::*;

    fn click_step(selector: &str, bounds: BoundingBox) -> RecordedStep {
        RecordedStep {
            step_number: 1,
            event_kind: EventKind::Click,
            value: None,
            descriptor: Bundle {
                primary_selector: Some(selector.to_string()),
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
                        selector: selector.to_string(),
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
            delay_ms: Some(0),
            conditional: None,
        }
    }

    async fn engine() -> PlaybackEngine {
        let store = Arc::new(InMemoryPatternStore::default());
        PlaybackEngine::new(EngineConfig::default(), store, PatternCacheConfig::default(), None, None)
            .await
            .expect("default evidence weights sum to 1.0")
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_unbalanced_evidence_weights() {
        let store = Arc::new(InMemoryPatternStore::default());
        let mut cfg = EngineConfig::default();
        cfg.evidence.weights.spatial += 0.5;
        let result = PlaybackEngine::new(cfg, store, PatternCacheConfig::default(), None, None).await;
        assert!(matches!(result, Err(PlaybackError::InvalidEvidenceWeights(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unchanged_page_resolves_without_healing() {
        let document = Arc::new(TestDocument::new());
        let bounds = BoundingBox::new(100.0, 200.0, 80.0, 30.0);
        document.insert(TestElement { tag: "button".into(), id: Some("submit".into()), bounds, ..Default::default() }, None);

        let engine = engine().await;
        let handle = engine.start_session(document, "session-1", "project-1", vec![click_step("#submit", bounds)]);
        let mut events = handle.subscribe();

        let result = loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap() {
                SessionEvent::StepComplete { result } => break result,
                _ => continue,
            }
        };

        assert!(result.success);
        assert!(!result.healing_applied);
        assert_eq!(result.final_selector, "#submit");

        let status = engine.status().await;
        assert_eq!(status.healing_stats.attempted, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn position_drift_with_a_broken_selector_heals_via_drift_correction() {
        let document = Arc::new(TestDocument::new());
        let recorded_bounds = BoundingBox::new(100.0, 200.0, 80.0, 30.0);
        let drifted_bounds = BoundingBox::new(100.0, 260.0, 80.0, 30.0);
        document.insert(TestElement { tag: "button".into(), id: Some("submit-renamed".into()), bounds: drifted_bounds, ..Default::default() }, None);

        let engine = engine().await;
        let handle = engine.start_session(document, "session-1", "project-1", vec![click_step("#submit", recorded_bounds)]);
        let mut events = handle.subscribe();

        let result = loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap() {
                SessionEvent::StepComplete { result } => break result,
                _ => continue,
            }
        };

        assert!(result.success);
        assert!(result.healing_applied);
        assert!(result.healing_confidence.unwrap_or_default() >= 0.7);
        assert!(!result.final_selector.is_empty());

        let status = engine.status().await;
        assert_eq!(status.healing_stats.attempted, 1);
        assert_eq!(status.healing_stats.successful, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pause_then_resume_runs_the_remaining_step() {
        let document = Arc::new(TestDocument::new());
        let bounds = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        document.insert(TestElement { tag: "button".into(), id: Some("go".into()), bounds, ..Default::default() }, None);

        let engine = engine().await;
        let handle = engine.start_session(document, "session-1", "project-1", vec![click_step("#go", bounds)]);
        handle.pause(Some("manual hold".to_string()));
        assert_eq!(handle.snapshot().status, playback_types::SessionStatus::Paused);

        // Give the (paused) session actor a moment to actually be blocked on
        // the pause notifier rather than racily completing first.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.resume();

        let mut events = handle.subscribe();
        let state = loop {
            match tokio::time::timeout(Duration::from_secs(2), events.recv()).await.unwrap().unwrap() {
                SessionEvent::SessionComplete { state } => break state,
                _ => continue,
            }
        };
        assert_eq!(state.status, playback_types::SessionStatus::Completed);
    }
}
