use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::errors::DiveInError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Summary {
    pub size_bytes: i64,
    pub inefficient_bytes: i64,
    pub efficiency_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub id: String,
    pub image: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub summary: Summary,
}

/// A persisted analysis: metadata plus the raw report, stored verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub metadata: Metadata,
    pub result: Box<RawValue>,
}

impl PartialEq for HistoryEntry {
    fn eq(&self, other: &Self) -> bool {
        self.metadata == other.metadata && self.result.get() == other.result.get()
    }
}

/// The subset of a dive report that feeds the history summary.
/// Missing or null fields read as zero.
#[derive(Debug, Default, Deserialize)]
struct SummaryPayload {
    #[serde(default)]
    image: Option<Summary>,
}

impl HistoryEntry {
    /// Build an entry from a finished analysis, deriving the summary from the report.
    ///
    /// Fails with `Validation` when the report is empty or not a JSON object
    /// with the expected shape.
    pub fn new(
        id: &str,
        image: &str,
        source: &str,
        created_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: &[u8],
    ) -> Result<Self, DiveInError> {
        if result.is_empty() {
            return Err(DiveInError::Validation(
                "analysis result is empty".to_string(),
            ));
        }

        let payload: SummaryPayload = serde_json::from_slice(result).map_err(|e| {
            DiveInError::Validation(format!("failed to parse analysis result: {}", e))
        })?;

        let text = String::from_utf8(result.to_vec()).map_err(|e| {
            DiveInError::Validation(format!("failed to parse analysis result: {}", e))
        })?;
        let raw = RawValue::from_string(text).map_err(|e| {
            DiveInError::Validation(format!("failed to parse analysis result: {}", e))
        })?;

        Ok(Self {
            metadata: Metadata {
                id: id.to_string(),
                image: image.to_string(),
                source: source.to_string(),
                created_at,
                completed_at,
                summary: payload.image.unwrap_or_default(),
            },
            result: raw,
        })
    }

    /// The raw report bytes.
    pub fn result_bytes(&self) -> &[u8] {
        self.result.get().as_bytes()
    }
}
