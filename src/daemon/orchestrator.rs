use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::daemon::analyzer::AnalysisRunner;
use crate::daemon::registry::JobRegistry;
use crate::errors::DiveInError;
use crate::models::job::resolve_target;
use crate::models::{AnalyzeRequest, HistoryEntry, JobStatus, ResolvedTarget};
use crate::storage::HistoryStore;

/// Handle to a submitted analysis.
pub struct RunHandle {
    pub job_id: String,
    /// Status at submission time, always `Queued`.
    pub status: JobStatus,
    pub join_handle: JoinHandle<()>,
}

/// Drives analysis jobs from submission to a terminal state.
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    history: Arc<dyn HistoryStore>,
    runner: Arc<dyn AnalysisRunner>,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        history: Arc<dyn HistoryStore>,
        runner: Arc<dyn AnalysisRunner>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            history,
            runner,
            timeout,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn runner(&self) -> &Arc<dyn AnalysisRunner> {
        &self.runner
    }

    /// Validate the request, register a `queued` job and start it in the
    /// background. Returns without waiting for the analysis.
    ///
    /// Invalid requests fail with `Validation` before any job is created.
    pub async fn submit(&self, req: &AnalyzeRequest) -> Result<RunHandle, DiveInError> {
        let resolved = resolve_target(req)?;

        let job = self
            .registry
            .create_with(|job| {
                job.source = resolved.source.as_str().to_string();
                job.target = resolved.target.clone();
            })
            .await;

        tracing::info!(
            "Analysis {} queued ({} {})",
            job.id,
            resolved.source,
            resolved.target
        );

        let join_handle = tokio::spawn(run_job(
            Arc::clone(&self.registry),
            Arc::clone(&self.history),
            Arc::clone(&self.runner),
            self.timeout,
            job.id.clone(),
            resolved,
        ));

        Ok(RunHandle {
            job_id: job.id,
            status: job.status,
            join_handle,
        })
    }

    pub async fn status(&self, id: &str) -> Result<(JobStatus, String), DiveInError> {
        let job = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| DiveInError::NotFound(format!("Analysis job '{}' not found", id)))?;
        Ok((job.status, job.message))
    }

    /// The report of a succeeded job.
    pub async fn result(&self, id: &str) -> Result<Vec<u8>, DiveInError> {
        let job = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| DiveInError::NotFound(format!("Analysis job '{}' not found", id)))?;

        if job.status != JobStatus::Succeeded {
            let message = if job.message.is_empty() {
                "Analysis is not complete yet".to_string()
            } else {
                job.message
            };
            return Err(DiveInError::NotReady {
                status: job.status,
                message,
            });
        }

        match job.result {
            Some(result) if !result.is_empty() => Ok(result),
            _ => Err(DiveInError::EmptyResult),
        }
    }
}

async fn run_job(
    registry: Arc<JobRegistry>,
    history: Arc<dyn HistoryStore>,
    runner: Arc<dyn AnalysisRunner>,
    timeout: Duration,
    job_id: String,
    resolved: ResolvedTarget,
) {
    registry
        .update(&job_id, |job| {
            job.status = JobStatus::Running;
            job.message.clear();
        })
        .await;
    tracing::info!("Analysis {} running", job_id);

    // The runner gets its own task so a panic still ends in `failed`.
    let ResolvedTarget { source, target } = resolved;
    let outcome = tokio::spawn(async move { runner.run(source, &target, timeout).await }).await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            fail_job(&registry, &job_id, e.to_string()).await;
            return;
        }
        Err(e) => {
            fail_job(&registry, &job_id, format!("Analysis task failed: {}", e)).await;
            return;
        }
    };

    let completed_at = Utc::now();
    registry
        .update(&job_id, |job| {
            job.status = JobStatus::Succeeded;
            job.message.clear();
            job.result = Some(result);
            job.completed_at = Some(completed_at);
        })
        .await;
    tracing::info!("Analysis {} succeeded", job_id);

    // Best effort: the job has already succeeded whatever happens here.
    let Some(job) = registry.get(&job_id).await else {
        return;
    };
    let entry = match HistoryEntry::new(
        &job.id,
        &job.target,
        &job.source,
        job.created_at,
        completed_at,
        job.result.as_deref().unwrap_or_default(),
    ) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!("Failed to build history entry for {}: {}", job_id, e);
            return;
        }
    };
    if let Err(e) = history.save(&entry).await {
        tracing::warn!("Failed to persist history entry for {}: {}", job_id, e);
    }
}

async fn fail_job(registry: &JobRegistry, job_id: &str, message: String) {
    tracing::warn!("Analysis {} failed: {}", job_id, message);
    let completed_at = Utc::now();
    registry
        .update(job_id, |job| {
            job.status = JobStatus::Failed;
            job.message = message;
            job.completed_at = Some(completed_at);
        })
        .await;
}
