use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::errors::DiveInError;
use crate::models::config::DEFAULT_HISTORY_MAX_ENTRIES;
use crate::models::{HistoryEntry, Metadata};
use crate::storage::HistoryStore;

const ENTRY_FILE_NAME: &str = "entry.json";
const EXPORTS_DIR_NAME: &str = "exports";

/// History store laid out as one directory per entry:
///
/// ```text
/// <dir>/<id>/entry.json
/// <dir>/<id>/exports/<filename>
/// ```
///
/// Every operation holds `lock`, so eviction after a save cannot race with
/// another save.
pub struct FsHistoryStore {
    dir: PathBuf,
    max_entries: usize,
    lock: Mutex<()>,
}

/// Only the metadata half of `entry.json`; the report is skipped when listing.
#[derive(Deserialize)]
struct StoredMetadata {
    metadata: Metadata,
}

fn storage_error(context: &str, err: impl Display) -> anyhow::Error {
    DiveInError::Storage(format!("{}: {}", context, err)).into()
}

fn not_found(id: &str) -> anyhow::Error {
    DiveInError::NotFound(format!("History entry '{}' not found", id)).into()
}

/// Ids and export filenames become path components, so they must be a
/// single plain component.
fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

impl FsHistoryStore {
    /// A store rooted at `dir`. The directory is created on first save.
    /// A `max_entries` of zero falls back to the default capacity.
    pub fn new(dir: PathBuf, max_entries: usize) -> Self {
        let max_entries = if max_entries == 0 {
            DEFAULT_HISTORY_MAX_ENTRIES
        } else {
            max_entries
        };
        Self {
            dir,
            max_entries,
            lock: Mutex::new(()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn entry_dir(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.entry_dir(id).join(ENTRY_FILE_NAME)
    }

    fn exports_dir(&self, id: &str) -> PathBuf {
        self.entry_dir(id).join(EXPORTS_DIR_NAME)
    }

    /// Write `data` to `path` via a sibling `.tmp` file and a rename, so a
    /// reader never observes a partial file.
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);

        if let Err(e) = tokio::fs::write(&tmp_path, data).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(storage_error("Failed to write temporary history file", e));
        }

        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(|e| storage_error("Failed to rename temporary history file", e))?;

        Ok(())
    }

    /// Read every parseable entry's metadata, keyed by its directory name.
    /// Must be called with `lock` held.
    async fn scan_locked(&self) -> Result<Vec<(String, Metadata)>> {
        let mut dir_entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_error("Failed to read history directory", e)),
        };

        let mut found = Vec::new();
        while let Some(dir_entry) = dir_entries
            .next_entry()
            .await
            .map_err(|e| storage_error("Failed to read history directory", e))?
        {
            let is_dir = match dir_entry.file_type().await {
                Ok(file_type) => file_type.is_dir(),
                Err(_) => false,
            };
            if !is_dir {
                continue;
            }
            let Some(key) = dir_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };

            let path = self.entry_path(&key);
            let content = match tokio::fs::read(&path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Skipping unreadable history entry {:?}: {}", path, e);
                    continue;
                }
            };
            match serde_json::from_slice::<StoredMetadata>(&content) {
                Ok(stored) if stored.metadata.id == key => found.push((key, stored.metadata)),
                Ok(stored) => {
                    tracing::warn!(
                        "Skipping history entry {:?}: id '{}' does not match directory",
                        path,
                        stored.metadata.id
                    );
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed history entry {:?}: {}", path, e);
                }
            }
        }

        Ok(found)
    }

    /// Remove the oldest entries until at most `max_entries` remain.
    /// Must be called with `lock` held.
    async fn prune_locked(&self) -> Result<()> {
        let mut entries = self.scan_locked().await?;
        if entries.len() <= self.max_entries {
            return Ok(());
        }

        // Oldest first; identical completion times fall back to id order.
        entries.sort_by(|(a_key, a), (b_key, b)| {
            a.completed_at
                .cmp(&b.completed_at)
                .then_with(|| a_key.cmp(b_key))
        });

        let to_remove = entries.len() - self.max_entries;
        for (key, _) in entries.iter().take(to_remove) {
            tracing::debug!("Evicting history entry {}", key);
            if let Err(e) = tokio::fs::remove_dir_all(self.entry_dir(key)).await {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Failed to evict history entry {}: {}", key, e);
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FsHistoryStore {
    async fn save(&self, entry: &HistoryEntry) -> Result<()> {
        let id = entry.metadata.id.as_str();
        if !is_safe_component(id) {
            return Err(DiveInError::Validation(format!("Invalid history entry id '{}'", id)).into());
        }

        let _guard = self.lock.lock().await;

        tokio::fs::create_dir_all(self.entry_dir(id))
            .await
            .map_err(|e| storage_error("Failed to create history entry directory", e))?;

        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| storage_error("Failed to serialize history entry", e))?;
        Self::write_atomic(&self.entry_path(id), &json).await?;

        self.prune_locked().await
    }

    async fn list(&self) -> Result<Vec<Metadata>> {
        let _guard = self.lock.lock().await;

        let mut results: Vec<Metadata> = self
            .scan_locked()
            .await?
            .into_iter()
            .map(|(_, metadata)| metadata)
            .collect();

        // Newest first, the exact reverse of eviction order.
        results.sort_by(|a, b| {
            b.completed_at
                .cmp(&a.completed_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        Ok(results)
    }

    async fn get(&self, id: &str) -> Result<HistoryEntry> {
        if !is_safe_component(id) {
            return Err(not_found(id));
        }

        let _guard = self.lock.lock().await;

        let content = match tokio::fs::read(self.entry_path(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(not_found(id)),
            Err(e) => return Err(storage_error("Failed to read history entry", e)),
        };

        serde_json::from_slice(&content)
            .map_err(|e| storage_error("Failed to parse history entry", e))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if !is_safe_component(id) {
            return Ok(());
        }

        let _guard = self.lock.lock().await;

        match tokio::fs::remove_dir_all(self.entry_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("Failed to delete history entry", e)),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        let _guard = self.lock.lock().await;

        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("Failed to delete history", e)),
        }
    }

    async fn write_export(&self, id: &str, filename: &str, data: &[u8]) -> Result<()> {
        if !is_safe_component(id) {
            return Err(not_found(id));
        }
        if !is_safe_component(filename) {
            return Err(
                DiveInError::Validation(format!("Invalid export filename '{}'", filename)).into(),
            );
        }

        let _guard = self.lock.lock().await;

        if !tokio::fs::try_exists(self.entry_path(id))
            .await
            .map_err(|e| storage_error("Failed to read history entry", e))?
        {
            return Err(not_found(id));
        }

        let exports_dir = self.exports_dir(id);
        tokio::fs::create_dir_all(&exports_dir)
            .await
            .map_err(|e| storage_error("Failed to prepare export storage", e))?;

        Self::write_atomic(&exports_dir.join(filename), data).await
    }

    async fn read_export(&self, id: &str, filename: &str) -> Result<Vec<u8>> {
        if !is_safe_component(id) || !is_safe_component(filename) {
            return Err(DiveInError::NotFound(format!("Export '{}' not found", filename)).into());
        }

        let _guard = self.lock.lock().await;

        match tokio::fs::read(self.exports_dir(id).join(filename)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(DiveInError::NotFound(format!("Export '{}' not found", filename)).into())
            }
            Err(e) => Err(storage_error("Failed to read export", e)),
        }
    }
}
