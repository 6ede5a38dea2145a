//! A JSON-file-backed [`PatternStore`], persisting the on-disk layout
//! `SPEC_FULL.md` §6 documents for the healing cache: `{data, savedAt,
//! version}`. The in-process cache debouncing this wraps lives in
//! `playback-store`; this adapter only knows how to read and write the
//! file `playback-store`'s actor calls `load`/`save` on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use playback_adapters::{PatternStore, StoreError};
use playback_types::HealingRecord;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// On-disk envelope around the persisted healing records.
#[derive(Serialize, Deserialize)]
struct PersistedFile {
    data: Vec<HealingRecord>,
    #[serde(rename = "savedAt")]
    saved_at: u64,
    version: String,
}

/// A [`PatternStore`] that reads and writes a single JSON file.
///
/// `record_success`/`lookup` serve out of an in-memory mirror kept in
/// sync by `load`/`save`, matching the split `playback-store`'s cache
/// actor expects between the durable adapter (this) and the in-memory
/// working set it maintains itself.
pub struct JsonFilePatternStore {
    path: PathBuf,
    records: parking_lot::Mutex<Vec<HealingRecord>>,
}

impl JsonFilePatternStore {
    /// Open `path`, loading any existing records into memory. A missing
    /// file is treated as an empty store rather than an error.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let records = match fs::read_to_string(&path).await {
            Ok(contents) => {
                let persisted: PersistedFile =
                    serde_json::from_str(&contents).map_err(|err| StoreError::Corrupt(err.to_string()))?;
                persisted.data
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(StoreError::Read(err.to_string())),
        };
        Ok(Self { path, records: parking_lot::Mutex::new(records) })
    }
}

#[async_trait]
impl PatternStore for JsonFilePatternStore {
    async fn load(&self) -> Result<Vec<HealingRecord>, StoreError> {
        Ok(self.records.lock().clone())
    }

    async fn save(&self, records: &[HealingRecord]) -> Result<(), StoreError> {
        *self.records.lock() = records.to_vec();
        let persisted = PersistedFile {
            data: records.to_vec(),
            saved_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            version: "1.0".to_string(),
        };
        let contents = serde_json::to_string_pretty(&persisted).map_err(|err| StoreError::Write(err.to_string()))?;
        if let Some(parent) = Path::new(&self.path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|err| StoreError::Write(err.to_string()))?;
            }
        }
        fs::write(&self.path, contents).await.map_err(|err| StoreError::Write(err.to_string()))
    }

    async fn record_success(&self, fingerprint: &str, healed_selector: &str, strategy: &str, confidence: f64) {
        self.records.lock().push(HealingRecord {
            original_fingerprint: fingerprint.to_string(),
            healed_selector: healed_selector.to_string(),
            strategy: strategy.to_string(),
            confidence,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            success: true,
        });
    }

    async fn lookup(&self, fingerprint: &str) -> Vec<HealingRecord> {
        self.records.lock().iter().filter(|r| r.original_fingerprint == fingerprint).cloned().collect()
    }
}
