//! The single record of which client config is currently patched.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::backup::store::BackupStore;

/// Original state of a client config file before it was rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalConfigRecord {
    pub file_path: PathBuf,
    pub original_content: String,
    pub backup_path: Option<PathBuf>,
}

/// Holds at most one [`OriginalConfigRecord`].
///
/// Uses a std mutex so the blocking exit path can reach it without a runtime.
#[derive(Debug, Default)]
pub struct OriginalConfigRegistry {
    record: Mutex<Option<OriginalConfigRecord>>,
}

impl OriginalConfigRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<OriginalConfigRecord>> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace any existing record.
    pub fn store(&self, record: OriginalConfigRecord) {
        tracing::debug!(path = %record.file_path.display(), "Original config recorded");
        *self.lock() = Some(record);
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn current(&self) -> Option<OriginalConfigRecord> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Remove and return the record.
    pub fn take(&self) -> Option<OriginalConfigRecord> {
        self.lock().take()
    }

    /// Restore the recorded file and clear the record, whatever the outcome.
    ///
    /// Returns `true` only when a file was actually written back.
    pub async fn restore_and_clear(&self, store: &BackupStore) -> bool {
        match self.take() {
            Some(record) => store.restore(&record).await,
            None => false,
        }
    }

    /// [`OriginalConfigRegistry::restore_and_clear`] with blocking I/O.
    pub fn restore_blocking(&self, store: &BackupStore) -> bool {
        match self.take() {
            Some(record) => store.restore_blocking(&record),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: PathBuf, content: &str) -> OriginalConfigRecord {
        OriginalConfigRecord {
            file_path: path,
            original_content: content.to_string(),
            backup_path: None,
        }
    }

    #[test]
    fn store_replaces_previous_record() {
        let registry = OriginalConfigRegistry::new();
        assert!(registry.is_empty());

        registry.store(record(PathBuf::from("/a.json"), "a"));
        registry.store(record(PathBuf::from("/b.json"), "b"));

        assert_eq!(registry.current().unwrap().file_path, PathBuf::from("/b.json"));
        registry.clear();
        assert!(registry.current().is_none());
    }

    #[tokio::test]
    async fn restore_and_clear_writes_back_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp.json");
        std::fs::write(&path, "rewritten").unwrap();

        let store = BackupStore::new("mcp-gateway");
        let registry = OriginalConfigRegistry::new();
        registry.store(record(path.clone(), "original"));

        assert!(registry.restore_and_clear(&store).await);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert!(registry.is_empty());

        std::fs::write(&path, "rewritten again").unwrap();
        assert!(!registry.restore_and_clear(&store).await);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "rewritten again");
    }

    #[test]
    fn failed_restore_still_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = BackupStore::new("mcp-gateway");
        let registry = OriginalConfigRegistry::new();
        registry.store(record(dir.path().join("deleted.json"), "original"));

        assert!(!registry.restore_blocking(&store));
        assert!(registry.is_empty());
    }
}
