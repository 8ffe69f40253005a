//! Timestamped backups of client configuration files.
//!
//! # Naming
//! ```text
//! .{basename}-{product}.{YYYY-MM-DD_HH-MM-SS}.json   current form
//! {path}.backup                                      legacy form
//! ```
//!
//! # Design Decisions
//! - Content comparison is canonical: JSON is re-serialized, other text trimmed
//! - Backups are never modified after creation
//! - Only files matching one of the two forms can be viewed, restored or deleted

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;

use crate::backup::atomic::{write_atomic, write_atomic_blocking};
use crate::backup::registry::OriginalConfigRecord;

/// Timestamp embedded in backup file names.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Suffix of the legacy `{path}.backup` form.
pub const LEGACY_SUFFIX: &str = ".backup";

/// Length of a rendered [`TIMESTAMP_FORMAT`].
const TIMESTAMP_LEN: usize = 19;

/// Errors from backup management operations.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("'{}' is not a recognised backup file", .0.display())]
    NotABackup(PathBuf),

    #[error("backup '{}' does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> BackupError + '_ {
        move |source| {
            if source.kind() == io::ErrorKind::NotFound {
                BackupError::NotFound(path.to_path_buf())
            } else {
                BackupError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        }
    }
}

/// Metadata describing one backup file on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub backup_path: PathBuf,
    pub original_path: PathBuf,
    pub source_basename: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
    pub legacy: bool,
}

/// Content of one backup, for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupView {
    pub backup_path: PathBuf,
    pub original_path: PathBuf,
    pub content: String,
    pub parsed: Option<Value>,
}

/// A file name recognised as a backup.
#[derive(Debug, Clone, PartialEq)]
struct BackupName {
    source_basename: String,
    created_at: Option<DateTime<Utc>>,
    legacy: bool,
}

/// Creates, finds and restores backups next to the files they protect.
#[derive(Debug, Clone)]
pub struct BackupStore {
    product_suffix: String,
}

impl BackupStore {
    pub fn new(product_suffix: impl Into<String>) -> Self {
        Self {
            product_suffix: product_suffix.into(),
        }
    }

    pub fn product_suffix(&self) -> &str {
        &self.product_suffix
    }

    /// Path of a backup of `original` taken at `at`.
    pub fn backup_path_for(&self, original: &Path, at: DateTime<Local>) -> PathBuf {
        let basename = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        original.with_file_name(format!(
            ".{}-{}.{}.json",
            basename,
            self.product_suffix,
            at.format(TIMESTAMP_FORMAT)
        ))
    }

    /// Most recently modified backup of `original`, in either naming form.
    pub async fn find_latest(&self, original: &Path) -> io::Result<Option<PathBuf>> {
        let Some(basename) = original.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return Ok(None);
        };
        let dir = parent_dir(original);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut latest: Option<(SystemTime, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            match self.parse_name(&file_name) {
                Some(name) if name.source_basename == basename => {}
                _ => continue,
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if latest.as_ref().map_or(true, |(best, _)| modified >= *best) {
                latest = Some((modified, entry.path()));
            }
        }

        Ok(latest.map(|(_, path)| path))
    }

    /// Back up `original` unless the latest backup already holds the same content.
    ///
    /// Returns the new backup's path, or `None` when creation was skipped.
    pub async fn create_or_skip(&self, original: &Path) -> Result<Option<PathBuf>, BackupError> {
        let current = fs::read(original).await.map_err(BackupError::io(original))?;

        if let Some(latest) = self.find_latest(original).await.map_err(BackupError::io(original))? {
            let previous = fs::read(&latest).await.map_err(BackupError::io(&latest))?;
            if canonicalize(&String::from_utf8_lossy(&previous))
                == canonicalize(&String::from_utf8_lossy(&current))
            {
                tracing::info!(
                    path = %original.display(),
                    latest = %latest.display(),
                    "Backup skipped, no changes since latest backup"
                );
                return Ok(None);
            }
        }

        let backup_path = self.backup_path_for(original, Local::now());
        fs::write(&backup_path, &current)
            .await
            .map_err(BackupError::io(&backup_path))?;

        tracing::info!(
            path = %original.display(),
            backup = %backup_path.display(),
            "Backup created"
        );
        Ok(Some(backup_path))
    }

    /// Write a record's original content back to its file.
    ///
    /// Never errors: failures are logged and reported as `false`.
    pub async fn restore(&self, record: &OriginalConfigRecord) -> bool {
        let path = &record.file_path;
        if !fs::try_exists(path).await.unwrap_or(false) {
            tracing::warn!(path = %path.display(), "Original config no longer exists, nothing to restore");
            return false;
        }

        match write_atomic(path, record.original_content.as_bytes()).await {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Original config restored");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to restore original config");
                false
            }
        }
    }

    /// [`BackupStore::restore`] using blocking I/O, for process-exit paths.
    pub fn restore_blocking(&self, record: &OriginalConfigRecord) -> bool {
        let path = &record.file_path;
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Original config no longer exists, nothing to restore");
            return false;
        }

        match write_atomic_blocking(path, record.original_content.as_bytes()) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Original config restored");
                true
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to restore original config");
                false
            }
        }
    }

    /// Every backup of every file in `originals`, newest first.
    pub async fn list(&self, originals: &[PathBuf]) -> Vec<BackupRecord> {
        let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
        let mut basenames: BTreeSet<(PathBuf, String)> = BTreeSet::new();
        for original in originals {
            if let Some(name) = original.file_name() {
                let dir = parent_dir(original);
                basenames.insert((dir.clone(), name.to_string_lossy().into_owned()));
                dirs.insert(dir);
            }
        }

        let mut records = Vec::new();
        for dir in dirs {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(_) => continue,
            };
            while let Ok(Some(entry)) = entries.next_entry().await {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let Some(name) = self.parse_name(&file_name) else {
                    continue;
                };
                if !basenames.contains(&(dir.clone(), name.source_basename.clone())) {
                    continue;
                }
                match self.record_for(&entry.path(), name).await {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::debug!(error = %e, "Skipping unreadable backup"),
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Read a backup for display.
    pub async fn view(&self, backup_path: &Path) -> Result<BackupView, BackupError> {
        let name = self.recognise(backup_path)?;
        let content = fs::read_to_string(backup_path)
            .await
            .map_err(BackupError::io(backup_path))?;
        let parsed = serde_json::from_str(&content).ok();

        Ok(BackupView {
            backup_path: backup_path.to_path_buf(),
            original_path: parent_dir(backup_path).join(&name.source_basename),
            content,
            parsed,
        })
    }

    /// Copy a backup over its original file. Returns the path written.
    pub async fn restore_backup(
        &self,
        backup_path: &Path,
        original_path: Option<&Path>,
    ) -> Result<PathBuf, BackupError> {
        let name = self.recognise(backup_path)?;
        let content = fs::read(backup_path).await.map_err(BackupError::io(backup_path))?;

        let target = match original_path {
            Some(path) => path.to_path_buf(),
            None => parent_dir(backup_path).join(&name.source_basename),
        };
        write_atomic(&target, &content)
            .await
            .map_err(BackupError::io(&target))?;

        tracing::info!(
            backup = %backup_path.display(),
            target = %target.display(),
            "Backup restored"
        );
        Ok(target)
    }

    /// Delete one backup file.
    pub async fn delete(&self, backup_path: &Path) -> Result<(), BackupError> {
        self.recognise(backup_path)?;
        fs::remove_file(backup_path)
            .await
            .map_err(BackupError::io(backup_path))?;
        tracing::info!(backup = %backup_path.display(), "Backup deleted");
        Ok(())
    }

    fn recognise(&self, backup_path: &Path) -> Result<BackupName, BackupError> {
        backup_path
            .file_name()
            .and_then(|n| self.parse_name(&n.to_string_lossy()))
            .ok_or_else(|| BackupError::NotABackup(backup_path.to_path_buf()))
    }

    async fn record_for(&self, path: &Path, name: BackupName) -> io::Result<BackupRecord> {
        let metadata = fs::metadata(path).await?;
        let modified_at: DateTime<Utc> = metadata.modified().map(Into::into).unwrap_or_else(|_| Utc::now());
        let created_at = name
            .created_at
            .or_else(|| metadata.created().ok().map(Into::into))
            .unwrap_or(modified_at);

        Ok(BackupRecord {
            backup_path: path.to_path_buf(),
            original_path: parent_dir(path).join(&name.source_basename),
            source_basename: name.source_basename,
            created_at,
            modified_at,
            size: metadata.len(),
            legacy: name.legacy,
        })
    }

    fn parse_name(&self, file_name: &str) -> Option<BackupName> {
        if let Some(name) = self.parse_current_name(file_name) {
            return Some(name);
        }

        let source = file_name.strip_suffix(LEGACY_SUFFIX)?;
        if source.is_empty() {
            return None;
        }
        Some(BackupName {
            source_basename: source.to_string(),
            created_at: None,
            legacy: true,
        })
    }

    fn parse_current_name(&self, file_name: &str) -> Option<BackupName> {
        let inner = file_name.strip_prefix('.')?.strip_suffix(".json")?;
        if inner.len() <= TIMESTAMP_LEN + 1 || !inner.is_char_boundary(inner.len() - TIMESTAMP_LEN) {
            return None;
        }
        let (head, timestamp) = inner.split_at(inner.len() - TIMESTAMP_LEN);
        let head = head.strip_suffix('.')?;
        let source = head.strip_suffix(&format!("-{}", self.product_suffix))?;
        if source.is_empty() {
            return None;
        }

        let naive = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
        let created_at = Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc));

        Some(BackupName {
            source_basename: source.to_string(),
            created_at,
            legacy: false,
        })
    }
}

/// Normal form used to decide whether two config texts are the same.
pub fn canonicalize(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value.to_string(),
        Err(_) => text.trim().to_string(),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
