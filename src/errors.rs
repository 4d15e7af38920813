use thiserror::Error;

use crate::models::JobStatus;

#[derive(Debug, Error)]
pub enum DiveInError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {message}")]
    NotReady { status: JobStatus, message: String },

    #[error("Analysis result is empty")]
    EmptyResult,

    #[error("{0}")]
    Tool(String),

    #[error("{0}")]
    Timeout(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiveInError {
    /// True when `err` (or anything it wraps) is a `NotFound`.
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<DiveInError>(),
            Some(DiveInError::NotFound(_))
        )
    }
}

impl From<std::io::Error> for DiveInError {
    fn from(err: std::io::Error) -> Self {
        DiveInError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DiveInError {
    fn from(err: serde_json::Error) -> Self {
        DiveInError::Storage(err.to_string())
    }
}
