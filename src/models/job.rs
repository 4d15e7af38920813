use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DiveInError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the analysis target is resolved and passed to `dive --source`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    #[serde(rename = "docker")]
    Docker,
    #[serde(rename = "docker-archive")]
    DockerArchive,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Docker => "docker",
            SourceKind::DockerArchive => "docker-archive",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory record of one analysis job. Owned by the job registry.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: String,
    pub status: JobStatus,
    pub message: String,
    pub result: Option<Vec<u8>>,
    pub source: String,
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(id: String) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            message: String::new(),
            result: None,
            source: String::new(),
            target: String::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<String>,
}

/// A request whose source kind and tool target have been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub source: SourceKind,
    pub target: String,
}

/// Resolve the tool target for an analyze request.
///
/// A blank source defaults to `docker`. `docker` needs an image reference,
/// `docker-archive` needs an archive path; anything else is rejected.
pub fn resolve_target(req: &AnalyzeRequest) -> Result<ResolvedTarget, DiveInError> {
    let source = match req.source.trim() {
        "" | "docker" => SourceKind::Docker,
        "docker-archive" => SourceKind::DockerArchive,
        other => {
            return Err(DiveInError::Validation(format!(
                "Unsupported source: {}",
                other
            )))
        }
    };

    let target = match source {
        SourceKind::Docker => {
            if req.image.trim().is_empty() {
                return Err(DiveInError::Validation(
                    "Image reference is required for Docker source".to_string(),
                ));
            }
            req.image.clone()
        }
        SourceKind::DockerArchive => match req.archive_path.as_deref() {
            Some(path) if !path.trim().is_empty() => path.to_string(),
            _ => {
                return Err(DiveInError::Validation(
                    "Archive path is required for docker-archive source".to_string(),
                ))
            }
        },
    };

    Ok(ResolvedTarget { source, target })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docker_request(image: &str) -> AnalyzeRequest {
        AnalyzeRequest {
            image: image.to_string(),
            source: "docker".to_string(),
            archive_path: None,
        }
    }

    #[test]
    fn test_job_status_serde_lowercase() {
        let json = serde_json::to_string(&JobStatus::Succeeded).expect("serialize");
        assert_eq!(json, "\"succeeded\"");
        let status: JobStatus = serde_json::from_str("\"queued\"").expect("deserialize");
        assert_eq!(status, JobStatus::Queued);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_new_record_is_queued_without_result() {
        let record = JobRecord::new("abc".to_string());
        assert_eq!(record.status, JobStatus::Queued);
        assert!(record.result.is_none());
        assert!(record.completed_at.is_none());
        assert!(record.message.is_empty());
    }

    #[test]
    fn test_resolve_docker_image() {
        let resolved = resolve_target(&docker_request("alpine:latest")).expect("resolve");
        assert_eq!(resolved.source, SourceKind::Docker);
        assert_eq!(resolved.target, "alpine:latest");
    }

    #[test]
    fn test_resolve_blank_source_defaults_to_docker() {
        let req = AnalyzeRequest {
            image: "nginx".to_string(),
            source: "   ".to_string(),
            archive_path: None,
        };
        let resolved = resolve_target(&req).expect("resolve");
        assert_eq!(resolved.source, SourceKind::Docker);
    }

    #[test]
    fn test_resolve_docker_requires_image() {
        let err = resolve_target(&docker_request("  ")).unwrap_err();
        match err {
            DiveInError::Validation(msg) => {
                assert_eq!(msg, "Image reference is required for Docker source")
            }
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[test]
    fn test_resolve_archive_path() {
        let req = AnalyzeRequest {
            image: String::new(),
            source: "docker-archive".to_string(),
            archive_path: Some("/tmp/image.tar".to_string()),
        };
        let resolved = resolve_target(&req).expect("resolve");
        assert_eq!(resolved.source, SourceKind::DockerArchive);
        assert_eq!(resolved.target, "/tmp/image.tar");
    }

    #[test]
    fn test_resolve_archive_requires_path() {
        let req = AnalyzeRequest {
            image: "alpine".to_string(),
            source: "docker-archive".to_string(),
            archive_path: None,
        };
        assert!(matches!(
            resolve_target(&req),
            Err(DiveInError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_unsupported_source() {
        let req = AnalyzeRequest {
            image: "alpine".to_string(),
            source: "podman".to_string(),
            archive_path: None,
        };
        match resolve_target(&req).unwrap_err() {
            DiveInError::Validation(msg) => assert_eq!(msg, "Unsupported source: podman"),
            other => panic!("Expected Validation, got: {:?}", other),
        }
    }

    #[test]
    fn test_analyze_request_camel_case_and_defaults() {
        let req: AnalyzeRequest =
            serde_json::from_str(r#"{"archivePath": "/a.tar", "source": "docker-archive"}"#)
                .expect("deserialize");
        assert_eq!(req.archive_path.as_deref(), Some("/a.tar"));
        assert!(req.image.is_empty());
    }
}
