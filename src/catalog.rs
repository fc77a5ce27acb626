//! Activity-type catalog — label ↔ key translation table.
//!
//! Warmed once at startup from the store and cached for the process
//! lifetime. Lookups return the input unchanged when no mapping exists, so
//! a stale or missing catalog degrades to raw keys in subjects rather than
//! failing.

use parking_lot::RwLock;

use crate::error::SyncError;
use crate::store::{ActivityTypeEntry, RecordStore};

#[derive(Debug, Default)]
pub struct TypeCatalog {
    entries: RwLock<Vec<ActivityTypeEntry>>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_entries(entries: Vec<ActivityTypeEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Load the translation table from the store. Errors surface to the
    /// caller; a failed warm leaves the previous (possibly empty) table in
    /// place.
    pub async fn warm(&self, store: &dyn RecordStore) -> Result<(), SyncError> {
        let entries = store.activity_types().await?;
        log::info!("type catalog warmed: {} entries", entries.len());
        *self.entries.write() = entries;
        Ok(())
    }

    pub fn is_warm(&self) -> bool {
        !self.entries.read().is_empty()
    }

    /// Display label for a stable key; the key itself when unmapped.
    pub fn label_of(&self, key: &str) -> String {
        self.entries
            .read()
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.label.clone())
            .unwrap_or_else(|| key.to_string())
    }

    /// Stable key for a display label; the label itself when unmapped.
    pub fn key_of(&self, label: &str) -> String {
        self.entries
            .read()
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.key.clone())
            .unwrap_or_else(|| label.to_string())
    }
}
