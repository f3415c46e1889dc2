//! Append-only JSON-lines store for screenshot records.
//!
//! The same file answers the duplicate-capture check: the newest record per
//! placement / creative-group pair is indexed in memory when the store opens
//! and kept current on every save.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{MetadataStore, ThrottleCheck};
use crate::types::ScreenshotRecord;
use crate::{CaptureError, Result};

type PairKey = (String, String);

pub struct RecordStore {
    path: PathBuf,
    latest: Mutex<HashMap<PairKey, u64>>,
    write_lock: tokio::sync::Mutex<()>,
}

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl RecordStore {
    /// Open (or start) the store at `path`, indexing existing records.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut latest: HashMap<PairKey, u64> = HashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => {
                for (n, line) in raw.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ScreenshotRecord>(line) {
                        Ok(record) => {
                            let entry = latest
                                .entry((record.placement, record.creative_group))
                                .or_insert(0);
                            *entry = (*entry).max(record.tstamp);
                        }
                        Err(e) => warn!(line = n + 1, error = %e, "skipping unreadable record"),
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(path = %path.display(), pairs = latest.len(), "record store opened");

        Ok(Self {
            path,
            latest: Mutex::new(latest),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn latest_for(&self, placement_id: &str, creative_group_id: &str) -> Option<u64> {
        self.latest.lock().ok().and_then(|latest| {
            latest
                .get(&(placement_id.to_string(), creative_group_id.to_string()))
                .copied()
        })
    }
}

#[async_trait]
impl ThrottleCheck for RecordStore {
    async fn captured_recently(
        &self,
        placement_id: &str,
        creative_group_id: &str,
        window: Duration,
    ) -> Result<bool> {
        let Some(tstamp) = self.latest_for(placement_id, creative_group_id) else {
            return Ok(false);
        };
        let cutoff = unix_millis().saturating_sub(window.as_millis() as u64);
        Ok(tstamp >= cutoff)
    }
}

#[async_trait]
impl MetadataStore for RecordStore {
    async fn save(&self, record: &ScreenshotRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| CaptureError::PersistFailed(format!("{}: {e}", self.path.display())))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| CaptureError::PersistFailed(format!("{}: {e}", self.path.display())))?;
        file.flush().await?;

        if let Ok(mut latest) = self.latest.lock() {
            let entry = latest
                .entry((record.placement.clone(), record.creative_group.clone()))
                .or_insert(0);
            *entry = (*entry).max(record.tstamp);
        }
        Ok(())
    }
}
