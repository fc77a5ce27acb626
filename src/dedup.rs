//! Persisted set of deal ids that already received a derived task.
//!
//! Lives as a small JSON array on disk so creation stays idempotent across
//! restarts. Explicitly resettable for operational do-overs. An unreadable
//! file degrades to an empty set with a warning — worst case a duplicate
//! task, never a crash.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::error::SyncError;

pub struct ProcessedIdSet {
    path: PathBuf,
    ids: Mutex<BTreeSet<i64>>,
}

impl ProcessedIdSet {
    /// Load the set from `data_dir/processed_deals.json` (missing file is
    /// an empty set).
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join("processed_deals.json");
        let ids = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeSet<i64>>(&content) {
                Ok(ids) => ids,
                Err(err) => {
                    log::warn!(
                        "processed-id set at {} unreadable ({}), starting empty",
                        path.display(),
                        err
                    );
                    BTreeSet::new()
                }
            },
            Err(_) => BTreeSet::new(),
        };
        Self {
            path,
            ids: Mutex::new(ids),
        }
    }

    pub async fn contains(&self, deal_id: i64) -> bool {
        self.ids.lock().await.contains(&deal_id)
    }

    /// Record a deal id and persist the set.
    pub async fn insert(&self, deal_id: i64) -> Result<(), SyncError> {
        let mut ids = self.ids.lock().await;
        if ids.insert(deal_id) {
            self.persist(&ids)?;
        }
        Ok(())
    }

    /// Forget everything, including on disk.
    pub async fn reset(&self) -> Result<(), SyncError> {
        let mut ids = self.ids.lock().await;
        ids.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        log::info!("processed-id set reset");
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    fn persist(&self, ids: &BTreeSet<i64>) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(&ids)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
