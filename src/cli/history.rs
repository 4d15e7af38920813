// CLI history commands: list, show, delete, clear

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::daemon;
use crate::errors::DiveInError;
use crate::models::Metadata;
use crate::storage::history::FsHistoryStore;
use crate::storage::HistoryStore;

/// Open the history store the backend would use with the same flags.
pub fn open_store(config: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<FsHistoryStore> {
    let config = daemon::load_config(config)?;
    let data_dir = daemon::effective_data_dir(&config, data_dir);
    Ok(FsHistoryStore::new(
        config.history_dir_in(&data_dir),
        config.history_max_entries,
    ))
}

/// Format a relative time string like "2 minutes ago".
fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let secs = Utc::now().signed_duration_since(*dt).num_seconds().max(0);
    if secs < 60 {
        format!("{} seconds ago", secs)
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}

/// Render a byte count as e.g. `12.3 MB`.
fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() > width {
        let head: String = value.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

fn print_table(entries: &[Metadata]) {
    println!(
        "{:<34}{:<32}{:<12}{:<12}{:<12}{:<18}",
        "ID", "IMAGE", "SIZE", "WASTED", "EFFICIENCY", "COMPLETED"
    );
    for meta in entries {
        println!(
            "{:<34}{:<32}{:<12}{:<12}{:<12}{:<18}",
            meta.id,
            truncate(&meta.image, 31),
            format_bytes(meta.summary.size_bytes),
            format_bytes(meta.summary.inefficient_bytes),
            format!("{:.2}%", meta.summary.efficiency_score * 100.0),
            format_relative_time(&meta.completed_at)
        );
    }
}

/// dive-in history list
pub async fn cmd_list(config: Option<&Path>, data_dir: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let store = open_store(config, data_dir)?;
    let entries = store.list().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No analyses in history.");
        return Ok(());
    }

    print_table(&entries);
    Ok(())
}

/// dive-in history show
pub async fn cmd_show(config: Option<&Path>, data_dir: Option<&Path>, id: &str) -> anyhow::Result<()> {
    let store = open_store(config, data_dir)?;
    let entry = store.get(id).await.map_err(|e| {
        if DiveInError::is_not_found(&e) {
            anyhow::anyhow!("History entry '{}' not found", id)
        } else {
            e
        }
    })?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

/// dive-in history delete
pub async fn cmd_delete(config: Option<&Path>, data_dir: Option<&Path>, id: &str) -> anyhow::Result<()> {
    let store = open_store(config, data_dir)?;
    if let Err(e) = store.get(id).await {
        if DiveInError::is_not_found(&e) {
            return Err(anyhow::anyhow!("History entry '{}' not found", id));
        }
        tracing::warn!("Entry {} is unreadable, deleting anyway: {:#}", id, e);
    }
    store.delete(id).await?;
    println!("History entry '{}' deleted.", id);
    Ok(())
}

/// dive-in history clear
pub async fn cmd_clear(config: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<()> {
    let store = open_store(config, data_dir)?;
    let count = store.list().await?.len();
    store.delete_all().await?;
    println!("Removed {} history entries.", count);
    Ok(())
}
