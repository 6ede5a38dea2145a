//! The `run` subcommand: seed a document, construct a [`PlaybackEngine`],
//! replay a scenario's steps, and print a per-step report as events arrive.

use std::{sync::Arc, time::Duration};

use playback_adapters::PatternStore;
use playback_config::PlaybackConfig;
use playback_engine::{PlaybackEngine, SessionEvent};
use playback_store::PatternCacheConfig;
use playback_testkit::InMemoryPatternStore;
use tokio::time::timeout;
use tracing::info;

use crate::{
    cli::RunArgs,
    error::{Error, Result},
    scenario::Scenario,
    store::JsonFilePatternStore,
};

/// Run the harness end to end and print a per-step report to stdout.
pub async fn run(args: &RunArgs) -> Result<()> {
    let scenario_contents = std::fs::read_to_string(&args.scenario)?;
    let scenario = Scenario::parse(&scenario_contents)?;
    let document = Arc::new(scenario.build_document());

    let config = match &args.config {
        Some(path) => playback_config::load_from_path(path)?,
        None => PlaybackConfig::default(),
    };

    let pattern_store: Arc<dyn PatternStore> = match &args.pattern_store {
        Some(path) => Arc::new(JsonFilePatternStore::open(path.clone()).await.map_err(|err| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
        })?),
        None => Arc::new(InMemoryPatternStore::default()),
    };

    let engine = PlaybackEngine::new(
        config.into_engine_config(),
        pattern_store,
        PatternCacheConfig::default(),
        None,
        None,
    )
    .await?;

    let handle = engine.start_session(document, "cli-session", "cli-project", scenario.steps);
    let mut events = handle.subscribe();

    let session_timeout = Duration::from_secs(args.timeout_secs);
    let drive = async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StepStart { step_number }) => {
                    println!("step {step_number}: starting");
                }
                Ok(SessionEvent::HealingApplied { step_number, strategy, selector, confidence }) => {
                    println!(
                        "step {step_number}: healed via {strategy:?} -> {selector:?} (confidence {confidence:.2})"
                    );
                }
                Ok(SessionEvent::StepComplete { result }) => {
                    let outcome = if result.success { "ok" } else { "FAILED" };
                    println!(
                        "step {}: {outcome} selector={:?} healed={} duration={:?}",
                        result.step_number, result.final_selector, result.healing_applied, result.duration
                    );
                    if let Some(error) = &result.error {
                        println!("  error: {error}");
                    }
                    if result.flagged_for_review {
                        println!("  flagged for manual review");
                    }
                }
                Ok(SessionEvent::StatusChanged { state }) => {
                    info!(status = ?state.status, "session status changed");
                }
                Ok(SessionEvent::SessionComplete { state }) => {
                    println!(
                        "session {}: {:?} ({}/{} steps executed, {} healed, {} failed)",
                        state.session_id,
                        state.status,
                        state.steps_executed.len(),
                        state.total_steps,
                        state.healing_stats.successful,
                        state.healing_stats.failed,
                    );
                    return Ok(());
                }
                Err(_) => return Ok(()),
            }
        }
    };

    match timeout(session_timeout, drive).await {
        Ok(result) => result,
        Err(_) => Err(Error::SessionTimeout(session_timeout)),
    }
}
