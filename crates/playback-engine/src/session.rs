//! Session actor: runs one recording's steps against a live document,
//! healing failures as it goes. See `SPEC_FULL.md` §4.9.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use playback_adapters::{DocumentView, EventInit, HealingProvider};
use playback_comparator::ComparatorConfig;
use playback_drift::DriftConfig;
use playback_store::PatternCacheHandle;
use playback_troubleshoot::{
    DiagnosticInputs, Outcome, ResolutionInputs, ResolutionStrategy, quick_troubleshoot, run_diagnostics, troubleshoot,
};
use playback_types::{EventKind, HealingStats, RecordedStep, SessionState, SessionStatus, descriptor_fingerprint};
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use crate::candidates::{self, synthesize_selector};
use crate::config::EngineConfig;
use crate::events::{SessionEvent, StepExecutionResult};
use crate::screenshots::decode_frame_b64;

/// Healing counters and step timing aggregated across every session an
/// engine has run, independent of whether those sessions are still alive.
#[derive(Default)]
pub struct EngineAggregate {
    healing_stats: Mutex<HealingStats>,
    last_step_duration: Mutex<Option<Duration>>,
}

impl EngineAggregate {
    fn record(&self, result: &StepExecutionResult, healing_attempted: bool) {
        *self.last_step_duration.lock() = Some(result.duration);
        if !healing_attempted {
            return;
        }
        let mut stats = self.healing_stats.lock();
        stats.attempted += 1;
        if result.healing_applied {
            stats.successful += 1;
            if result.healing_strategy == Some(ResolutionStrategy::HealingCache) {
                stats.cached += 1;
            }
        } else {
            stats.failed += 1;
        }
    }

    /// Snapshot of the aggregated counters, for [`crate::EngineStatus`].
    pub fn snapshot(&self) -> (HealingStats, Option<Duration>) {
        (*self.healing_stats.lock(), *self.last_step_duration.lock())
    }
}

/// Control handle for a running session: pause/resume/abort and an event
/// subscription. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    abort_token: CancellationToken,
    paused: Arc<AtomicBool>,
    pause_notify: Arc<Notify>,
    current_skip: Arc<Mutex<Option<CancellationToken>>>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// A snapshot of the session's current bookkeeping.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Subscribe to this session's event stream. Events sent before this
    /// call are not replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    /// Suspend execution; takes effect at the next step boundary.
    pub fn pause(&self, reason: Option<String>) {
        self.paused.store(true, Ordering::Release);
        let mut state = self.state.lock();
        state.status = SessionStatus::Paused;
        state.pause_reason = reason;
        let _ = self.events_tx.send(SessionEvent::StatusChanged { state: state.clone() });
    }

    /// Resume a paused session.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        {
            let mut state = self.state.lock();
            if state.status == SessionStatus::Paused {
                state.status = SessionStatus::Running;
                state.pause_reason = None;
            }
        }
        self.pause_notify.notify_waiters();
    }

    /// Abort the session. Cascades into any in-flight delay or healing
    /// call via the shared cancellation hierarchy.
    pub fn abort(&self) {
        self.abort_token.cancel();
        self.paused.store(false, Ordering::Release);
        self.pause_notify.notify_waiters();
    }

    /// Resolve the current step's delay immediately, without aborting the
    /// session.
    pub fn skip_current_delay(&self) {
        if let Some(token) = self.current_skip.lock().clone() {
            token.cancel();
        }
    }
}

fn strategy_name(strategy: ResolutionStrategy) -> &'static str {
    match strategy {
        ResolutionStrategy::RetryOriginal => "retry-original",
        ResolutionStrategy::DriftCorrection => "drift-correction",
        ResolutionStrategy::GraphNavigation => "graph-navigation",
        ResolutionStrategy::EvidenceScoring => "evidence-scoring",
        ResolutionStrategy::HealingCache => "healing-cache",
        ResolutionStrategy::ScreenshotLocate => "screenshot-locate",
        ResolutionStrategy::LocalVision => "local-vision",
        ResolutionStrategy::AiVision => "ai-vision",
    }
}

async fn select_option<D: DocumentView>(document: &D, node: &D::Node, value: &str) -> playback_action::Result<()> {
    if !document.focus(node) {
        return Err(playback_action::ActionError::FocusFailed);
    }
    if !document.set_native_value(node, value) {
        return Err(playback_action::ActionError::FirstInputRejected);
    }
    document.dispatch(node, "input", EventInit { data: Some(value.to_string()), ..Default::default() });
    document.dispatch(node, "change", EventInit::default());
    Ok(())
}

async fn dispatch_action<D: DocumentView>(document: &D, node: &D::Node, step: &RecordedStep, cfg: playback_action::ActionConfig) -> playback_action::Result<()> {
    match step.event_kind {
        EventKind::Click | EventKind::Navigate => playback_action::click(document, node, cfg).await,
        EventKind::Input | EventKind::Type => {
            let value = step.value.as_deref().unwrap_or_default();
            playback_action::type_text(document, node, value, &step.descriptor, cfg).await
        }
        EventKind::Keypress => match step.value.as_deref() {
            Some("Enter") | None => playback_action::press_enter(document, node, &step.descriptor, cfg).await,
            Some(key) => playback_action::press_key(document, node, key, cfg).await,
        },
        EventKind::Select => select_option(document, node, step.value.as_deref().unwrap_or_default()).await,
        EventKind::Delay | EventKind::Conditional => Ok(()),
    }
}

fn conditional_result(step: &RecordedStep, started: Instant, document_has_condition: bool) -> StepExecutionResult {
    let skip_if_absent = step.conditional.as_ref().map(|c| c.skip_if_absent).unwrap_or(true);
    let success = document_has_condition || skip_if_absent;
    StepExecutionResult {
        step_number: step.step_number,
        success,
        final_selector: String::new(),
        healing_applied: false,
        healing_strategy: None,
        healing_confidence: None,
        flagged_for_review: false,
        diagnostics: Vec::new(),
        error: (!success).then(|| "condition selector absent and step is not skippable".to_string()),
        duration: started.elapsed(),
        suggest_recording_update: false,
    }
}

struct StepContext<'a, D: DocumentView> {
    document: &'a D,
    cfg: &'a EngineConfig,
    pattern_cache: &'a PatternCacheHandle,
    local_vision: Option<&'a (dyn HealingProvider + Sync)>,
    ai_vision: Option<&'a (dyn HealingProvider + Sync)>,
}

async fn execute_step<D: DocumentView>(ctx: &StepContext<'_, D>, step: &RecordedStep, skip_token: CancellationToken) -> StepExecutionResult {
    let started = Instant::now();

    if step.event_kind == EventKind::Conditional {
        let present = step
            .conditional
            .as_ref()
            .and_then(|c| c.condition_selector.as_deref())
            .map(|selector| ctx.document.query(selector).is_some())
            .unwrap_or(true);
        return conditional_result(step, started, present);
    }

    let decision = playback_delay::calculate(step, ctx.cfg.delay);
    playback_delay::execute(decision.delay_ms, &skip_token).await;

    if step.event_kind == EventKind::Delay {
        return StepExecutionResult {
            step_number: step.step_number,
            success: true,
            final_selector: String::new(),
            healing_applied: false,
            healing_strategy: None,
            healing_confidence: None,
            flagged_for_review: false,
            diagnostics: Vec::new(),
            error: None,
            duration: started.elapsed(),
            suggest_recording_update: false,
        };
    }

    let find_result = playback_finder::find(ctx.document, &step.descriptor, ctx.cfg.element_timeout).await;
    let mut node = find_result.element.clone();

    let recorded_region = step.descriptor.recorded_screenshot.as_deref().and_then(decode_frame_b64);
    let mut compare_result = None;
    let mut screenshot_ok = true;
    if let Some(current_node) = &node {
        if ctx.cfg.screenshot_comparison_enabled {
            if let (Some(recorded), Some(bounds)) = (&recorded_region, ctx.document.bounding_rect(current_node)) {
                let current = ctx.document.capture_region(bounds).await;
                let comparator_cfg = ComparatorConfig { match_threshold: ctx.cfg.screenshot_threshold, ..ComparatorConfig::default() };
                let result = playback_comparator::quick_compare(Some(recorded), current.as_ref(), comparator_cfg);
                screenshot_ok = result.is_match;
                compare_result = Some(result);
            }
        }
    }

    let mut final_selector = String::new();
    let mut healing_applied = false;
    let mut healing_strategy = None;
    let mut healing_confidence = None;
    let mut flagged_for_review = false;
    let mut suggest_recording_update = false;
    let mut diagnostics = Vec::new();

    if (node.is_none() || !screenshot_ok) && ctx.cfg.self_healing_enabled {
        let fingerprint = descriptor_fingerprint(&step.descriptor);
        let cached_records = ctx.pattern_cache.lookup(fingerprint.clone()).await;
        let gathered = candidates::gather(ctx.document, step, ctx.cfg, &cached_records);

        let element_style = node.as_ref().map(|n| ctx.document.computed_style(n));
        let drift_result = if ctx.cfg.drift_detection_enabled {
            let current = node
                .as_ref()
                .and_then(|n| ctx.document.bounding_rect(n).map(|bounds| (bounds, ctx.document.computed_style(n))));
            Some(playback_drift::detect(
                &step.descriptor.original_bounds,
                current.as_ref().map(|(bounds, style)| (bounds, *style)),
                step.descriptor.primary_selector.as_deref(),
                None,
                DriftConfig { position_tau: ctx.cfg.drift_threshold, ..DriftConfig::default() },
            ))
        } else {
            None
        };

        let diag_inputs = DiagnosticInputs {
            descriptor: &step.descriptor,
            element_exists: node.is_some(),
            element_style,
            ready_state: ctx.document.ready_state(),
            screenshot_compare: compare_result.as_ref(),
            drift: drift_result.as_ref(),
            graph_resolvable_count: gathered.graph_resolvable_count,
            graph_total_count: gathered.graph_total_count,
            iframe_accessible: true,
            shadow_accessible: true,
        };
        diagnostics = run_diagnostics(&diag_inputs);

        let current_viewport = ctx.document.capture_viewport().await;
        let attempted_selectors: Vec<String> = find_result.attempts.iter().map(|a| format!("{:?}", a.strategy)).collect();

        let resolution_inputs = ResolutionInputs {
            document: ctx.document,
            step,
            attempted_selectors: &attempted_selectors,
            candidates: &gathered.candidates,
            current_viewport: current_viewport.as_ref(),
            recorded_region: recorded_region.as_ref(),
            cached_records: &cached_records,
            local_vision: ctx.local_vision,
            ai_vision: if ctx.cfg.ai_healing_enabled { ctx.ai_vision } else { None },
            healing_timeout: ctx.cfg.healing_provider_timeout,
            cancellation: skip_token.clone(),
            drift_enabled: ctx.cfg.drift_detection_enabled,
        };

        let resolution = match quick_troubleshoot(&resolution_inputs) {
            Some(resolution) => Some(resolution),
            None => match troubleshoot(resolution_inputs).await {
                Outcome::Resolved(resolution) => Some(resolution),
                Outcome::Unresolved => None,
            },
        };

        if let Some(resolution) = resolution {
            healing_applied = true;
            healing_strategy = Some(resolution.strategy);
            healing_confidence = Some(resolution.confidence);
            flagged_for_review = ctx.cfg.flag_medium_confidence && resolution.confidence < 0.9;
            suggest_recording_update = resolution.should_update_recording;

            let healed_selector = resolution
                .element
                .as_ref()
                .map(|healed_node| resolution.selector.clone().unwrap_or_else(|| synthesize_selector(ctx.document, healed_node)));

            if ctx.cfg.auto_apply_healings {
                if let Some(healed_node) = &resolution.element {
                    final_selector = healed_selector.clone().unwrap_or_default();
                    node = Some(healed_node.clone());
                }
            }

            if resolution.should_cache {
                if let Some(healed_selector) = healed_selector {
                    ctx.pattern_cache.record_success(fingerprint, healed_selector, strategy_name(resolution.strategy), resolution.confidence);
                }
            }
        }
    }

    let (success, error) = match &node {
        Some(n) => {
            if final_selector.is_empty() {
                final_selector = if healing_applied {
                    synthesize_selector(ctx.document, n)
                } else {
                    step.descriptor.primary_selector.clone().unwrap_or_default()
                };
            }
            match dispatch_action(ctx.document, n, step, ctx.cfg.action).await {
                Ok(()) => (true, None),
                Err(err) => (false, Some(err.to_string())),
            }
        }
        None => (false, Some("element could not be located".to_string())),
    };

    StepExecutionResult {
        step_number: step.step_number,
        success,
        final_selector,
        healing_applied,
        healing_strategy,
        healing_confidence,
        flagged_for_review,
        diagnostics,
        error,
        duration: started.elapsed(),
        suggest_recording_update,
    }
}

async fn run_session<D: DocumentView + 'static>(
    document: Arc<D>,
    steps: Vec<RecordedStep>,
    cfg: EngineConfig,
    state: Arc<Mutex<SessionState>>,
    abort_token: CancellationToken,
    paused: Arc<AtomicBool>,
    pause_notify: Arc<Notify>,
    current_skip: Arc<Mutex<Option<CancellationToken>>>,
    pattern_cache: PatternCacheHandle,
    local_vision: Option<Arc<dyn HealingProvider + Sync>>,
    ai_vision: Option<Arc<dyn HealingProvider + Sync>>,
    events_tx: broadcast::Sender<SessionEvent>,
    aggregate: Arc<EngineAggregate>,
    sessions_running: Arc<AtomicUsize>,
) {
    let ctx = StepContext {
        document: document.as_ref(),
        cfg: &cfg,
        pattern_cache: &pattern_cache,
        local_vision: local_vision.as_deref(),
        ai_vision: ai_vision.as_deref(),
    };

    let mut final_status = SessionStatus::Completed;

    'steps: for (index, step) in steps.iter().enumerate() {
        loop {
            if abort_token.is_cancelled() {
                final_status = SessionStatus::Aborted;
                break 'steps;
            }
            if !paused.load(Ordering::Acquire) {
                break;
            }
            pause_notify.notified().await;
        }

        {
            let mut state = state.lock();
            state.current_step_index = index;
        }
        let _ = events_tx.send(SessionEvent::StepStart { step_number: step.step_number });

        let skip_token = abort_token.child_token();
        *current_skip.lock() = Some(skip_token.clone());
        let result = execute_step(&ctx, step, skip_token).await;
        *current_skip.lock() = None;

        let healing_attempted = !result.diagnostics.is_empty();
        aggregate.record(&result, healing_attempted);

        {
            let mut state = state.lock();
            state.steps_executed.push(index);
            if healing_attempted {
                state.healing_stats.attempted += 1;
                if result.healing_applied {
                    state.healing_stats.successful += 1;
                    if result.healing_strategy == Some(ResolutionStrategy::HealingCache) {
                        state.healing_stats.cached += 1;
                    }
                } else {
                    state.healing_stats.failed += 1;
                }
            }
        }

        if result.healing_applied {
            let _ = events_tx.send(SessionEvent::HealingApplied {
                step_number: step.step_number,
                strategy: result.healing_strategy.expect("healing_applied implies a strategy"),
                selector: Some(result.final_selector.clone()),
                confidence: result.healing_confidence.unwrap_or_default(),
            });
        }

        let step_failed = !result.success;
        let _ = events_tx.send(SessionEvent::StepComplete { result });

        if step_failed && cfg.stop_on_error {
            final_status = SessionStatus::Failed;
            break 'steps;
        }
    }

    let final_state = {
        let mut state = state.lock();
        state.status = final_status;
        state.clone()
    };
    let _ = events_tx.send(SessionEvent::StatusChanged { state: final_state.clone() });
    let _ = events_tx.send(SessionEvent::SessionComplete { state: final_state });
    let _ = pattern_cache.flush().await;
    sessions_running.fetch_sub(1, Ordering::AcqRel);
}

/// Spawn a session actor over `steps`, returning a control handle.
#[allow(clippy::too_many_arguments)]
pub fn spawn<D: DocumentView + 'static>(
    document: Arc<D>,
    session_id: impl Into<String>,
    project_id: impl Into<String>,
    steps: Vec<RecordedStep>,
    cfg: EngineConfig,
    pattern_cache: PatternCacheHandle,
    local_vision: Option<Arc<dyn HealingProvider + Sync>>,
    ai_vision: Option<Arc<dyn HealingProvider + Sync>>,
    aggregate: Arc<EngineAggregate>,
    sessions_running: Arc<AtomicUsize>,
) -> SessionHandle {
    let state = Arc::new(Mutex::new(SessionState::new(session_id, project_id, steps.len())));
    let abort_token = CancellationToken::new();
    let paused = Arc::new(AtomicBool::new(false));
    let pause_notify = Arc::new(Notify::new());
    let current_skip = Arc::new(Mutex::new(None));
    let (events_tx, _rx) = broadcast::channel(256);

    sessions_running.fetch_add(1, Ordering::AcqRel);

    tokio::spawn(run_session(
        document,
        steps,
        cfg,
        state.clone(),
        abort_token.clone(),
        paused.clone(),
        pause_notify.clone(),
        current_skip.clone(),
        pattern_cache,
        local_vision,
        ai_vision,
        events_tx.clone(),
        aggregate,
        sessions_running,
    ));

    SessionHandle { state, abort_token, paused, pause_notify, current_skip, events_tx }
}
