use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_HISTORY_MAX_ENTRIES: usize = 50;
pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen on this Unix domain socket instead of `host:port`.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/history`.
    #[serde(default)]
    pub history_dir: Option<PathBuf>,
    /// Non-positive values fall back to the default.
    #[serde(
        default = "default_history_max_entries",
        deserialize_with = "deserialize_history_max_entries"
    )]
    pub history_max_entries: usize,
    /// Non-positive values fall back to the default.
    #[serde(
        default = "default_analysis_timeout_secs",
        deserialize_with = "deserialize_analysis_timeout_secs"
    )]
    pub analysis_timeout_secs: u64,
    #[serde(default = "default_dive_path")]
    pub dive_path: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8377
}

fn default_history_max_entries() -> usize {
    DEFAULT_HISTORY_MAX_ENTRIES
}

fn default_analysis_timeout_secs() -> u64 {
    DEFAULT_ANALYSIS_TIMEOUT_SECS
}

fn deserialize_history_max_entries<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(usize::try_from(value)
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_HISTORY_MAX_ENTRIES))
}

fn deserialize_analysis_timeout_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(u64::try_from(value)
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_ANALYSIS_TIMEOUT_SECS))
}

fn default_dive_path() -> String {
    "dive".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            socket_path: None,
            data_dir: None,
            history_dir: None,
            history_max_entries: default_history_max_entries(),
            analysis_timeout_secs: default_analysis_timeout_secs(),
            dive_path: default_dive_path(),
        }
    }
}

impl DaemonConfig {
    /// A zero timeout means the default.
    pub fn analysis_timeout(&self) -> Duration {
        match self.analysis_timeout_secs {
            0 => Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    /// Resolve the history directory against the given data directory.
    pub fn history_dir_in(&self, data_dir: &std::path::Path) -> PathBuf {
        self.history_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("history"))
    }
}
