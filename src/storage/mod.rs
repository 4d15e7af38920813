pub mod history;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{HistoryEntry, Metadata};

/// Durable, bounded collection of completed analyses.
///
/// Lookups of unknown ids fail with `DiveInError::NotFound`; other failures
/// surface as `DiveInError::Storage`.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn save(&self, entry: &HistoryEntry) -> Result<()>;
    /// Metadata of every readable entry, most recently completed first.
    async fn list(&self) -> Result<Vec<Metadata>>;
    async fn get(&self, id: &str) -> Result<HistoryEntry>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn delete_all(&self) -> Result<()>;
    async fn write_export(&self, id: &str, filename: &str, data: &[u8]) -> Result<()>;
    async fn read_export(&self, id: &str, filename: &str) -> Result<Vec<u8>>;
}
