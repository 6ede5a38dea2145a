//! Pattern Store cache (C10).
//!
//! Sits in front of a [`PatternStore`] adapter and is the only
//! process-wide mutable resource in the playback core (§5): writes are
//! debounced, gated on a dirty flag, and serialized through a single
//! actor loop so concurrent `record_success` calls never race a save.
#![warn(missing_docs)]

use std::{sync::Arc, time::Duration};

use playback_adapters::PatternStore;
use playback_types::HealingRecord;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Tuning for the cache's background persistence loop.
#[derive(Clone, Copy, Debug)]
pub struct PatternCacheConfig {
    /// Wait this long after the last mutation before saving.
    pub debounce: Duration,
    /// Save on this interval regardless of debounce, if dirty.
    pub autosave_interval: Duration,
}

impl Default for PatternCacheConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            autosave_interval: Duration::from_secs(30),
        }
    }
}

enum Command {
    RecordSuccess {
        fingerprint: String,
        healed_selector: String,
        strategy: String,
        confidence: f64,
    },
    Lookup {
        fingerprint: String,
        respond: oneshot::Sender<Vec<HealingRecord>>,
    },
    Flush {
        respond: oneshot::Sender<Result<(), String>>,
    },
    Len {
        respond: oneshot::Sender<usize>,
    },
}

/// Cheap, clonable handle to the pattern cache actor.
#[derive(Clone, Debug)]
pub struct PatternCacheHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PatternCacheHandle {
    /// Record a successful (or attempted) healing. Queues a debounced
    /// save; does not wait for it to land.
    pub fn record_success(&self, fingerprint: impl Into<String>, healed_selector: impl Into<String>, strategy: impl Into<String>, confidence: f64) {
        let _ = self.tx.send(Command::RecordSuccess {
            fingerprint: fingerprint.into(),
            healed_selector: healed_selector.into(),
            strategy: strategy.into(),
            confidence,
        });
    }

    /// Look up prior healings for a descriptor fingerprint.
    pub async fn lookup(&self, fingerprint: impl Into<String>) -> Vec<HealingRecord> {
        let (respond, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Lookup { fingerprint: fingerprint.into(), respond });
        rx.await.unwrap_or_default()
    }

    /// Force an immediate save, bypassing debounce. Used by session
    /// shutdown to guarantee the last healing of the session is
    /// persisted before the process exits.
    pub async fn flush(&self) -> Result<(), String> {
        let (respond, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Flush { respond });
        rx.await.unwrap_or_else(|_| Err("pattern cache actor is gone".to_string()))
    }

    /// Number of healing records currently held in the cache.
    pub async fn len(&self) -> usize {
        let (respond, rx) = oneshot::channel();
        let _ = self.tx.send(Command::Len { respond });
        rx.await.unwrap_or(0)
    }
}

/// Spawn the cache actor, loading its initial records from `store`.
///
/// The actor runs until its handle (and every clone) is dropped.
pub async fn spawn(store: Arc<dyn PatternStore>, cfg: PatternCacheConfig) -> PatternCacheHandle {
    let records = store.load().await.unwrap_or_else(|err| {
        warn!(error = %err, "failed to load persisted healing records, starting empty");
        Vec::new()
    });
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_actor(store, records, cfg, rx));
    PatternCacheHandle { tx }
}

async fn save(store: &Arc<dyn PatternStore>, records: &[HealingRecord]) -> Result<(), String> {
    store.save(records).await.map_err(|err| err.to_string())
}

async fn run_actor(
    store: Arc<dyn PatternStore>,
    mut records: Vec<HealingRecord>,
    cfg: PatternCacheConfig,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut dirty = false;
    let mut debounce_deadline = tokio::time::Instant::now() + cfg.autosave_interval;
    let mut autosave = tokio::time::interval(cfg.autosave_interval);

    loop {
        tokio::select! {
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    Command::RecordSuccess { fingerprint, healed_selector, strategy, confidence } => {
                        records.push(HealingRecord {
                            original_fingerprint: fingerprint,
                            healed_selector,
                            strategy,
                            confidence,
                            timestamp: 0,
                            success: true,
                        });
                        dirty = true;
                        debounce_deadline = tokio::time::Instant::now() + cfg.debounce;
                    }
                    Command::Lookup { fingerprint, respond } => {
                        let matches = records
                            .iter()
                            .filter(|r| r.original_fingerprint == fingerprint)
                            .cloned()
                            .collect();
                        let _ = respond.send(matches);
                    }
                    Command::Flush { respond } => {
                        let result = save(&store, &records).await;
                        dirty = dirty && result.is_err();
                        let _ = respond.send(result);
                    }
                    Command::Len { respond } => {
                        let _ = respond.send(records.len());
                    }
                }
            }
            () = tokio::time::sleep_until(debounce_deadline), if dirty => {
                if save(&store, &records).await.is_ok() {
                    dirty = false;
                }
            }
            _ = autosave.tick() => {
                if dirty && save(&store, &records).await.is_ok() {
                    dirty = false;
                }
            }
        }
    }

    if dirty {
        let _ = save(&store, &records).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use playback_adapters::StoreError;

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<HealingRecord>>,
        save_calls: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl PatternStore for MemoryStore {
        async fn load(&self) -> Result<Vec<HealingRecord>, StoreError> {
            Ok(self.saved.lock().clone())
        }
        async fn save(&self, records: &[HealingRecord]) -> Result<(), StoreError> {
            *self.saved.lock() = records.to_vec();
            *self.save_calls.lock() += 1;
            Ok(())
        }
        async fn record_success(&self, _fingerprint: &str, _healed_selector: &str, _strategy: &str, _confidence: f64) {}
        async fn lookup(&self, _fingerprint: &str) -> Vec<HealingRecord> {
            Vec::new()
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn record_success_is_visible_via_lookup_without_waiting_for_save() {
        let store = Arc::new(MemoryStore::default());
        let handle = spawn(store.clone(), PatternCacheConfig::default()).await;
        handle.record_success("fp-1", "#healed", "graph-navigation", 0.8);
        let found = handle.lookup("fp-1").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].healed_selector, "#healed");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_persists_immediately() {
        let store = Arc::new(MemoryStore::default());
        let handle = spawn(store.clone(), PatternCacheConfig::default()).await;
        handle.record_success("fp-1", "#healed", "graph-navigation", 0.8);
        handle.flush().await.unwrap();
        assert_eq!(store.saved.lock().len(), 1);
        assert!(*store.save_calls.lock() >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn debounce_eventually_persists_without_explicit_flush() {
        let store = Arc::new(MemoryStore::default());
        let cfg = PatternCacheConfig {
            debounce: Duration::from_millis(10),
            autosave_interval: Duration::from_secs(60),
        };
        let handle = spawn(store.clone(), cfg).await;
        handle.record_success("fp-1", "#healed", "graph-navigation", 0.8);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.saved.lock().len(), 1);
    }
}
