use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::ci::{self, RulesRequest};
use crate::errors::DiveInError;
use crate::exports::{self, ExportFormat};
use crate::models::{AnalyzeRequest, JobStatus};

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Body of `409`/`500` answers from the result endpoint.
#[derive(Debug, Serialize)]
pub struct AnalysisErrorResponse {
    pub status: JobStatus,
    pub message: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Map a history store failure, logging anything other than a missing entry.
fn history_error(err: anyhow::Error, not_found: &str, failure: &str) -> Response {
    if DiveInError::is_not_found(&err) {
        error_response(StatusCode::NOT_FOUND, not_found)
    } else {
        tracing::error!("{}: {:#}", failure, err);
        error_response(StatusCode::INTERNAL_SERVER_ERROR, failure)
    }
}

// ---------------------------------------------------------------------------
// Tool check
// ---------------------------------------------------------------------------

pub async fn check_dive(State(state): State<Arc<AppState>>) -> Response {
    if state.orchestrator.runner().is_available() {
        (
            StatusCode::OK,
            Json(ErrorResponse {
                message: "Dive is installed".to_string(),
            }),
        )
            .into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "Dive is not found")
    }
}

// ---------------------------------------------------------------------------
// Analysis jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// POST /analyze
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid analyze request payload");
    };

    match state.orchestrator.submit(&req).await {
        Ok(handle) => (
            StatusCode::ACCEPTED,
            Json(AnalyzeResponse {
                job_id: handle.job_id,
                status: handle.status,
            }),
        )
            .into_response(),
        Err(DiveInError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            tracing::error!("Failed to submit analysis: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to submit analysis")
        }
    }
}

/// GET /analysis/{id}/status
pub async fn analysis_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.orchestrator.status(&id).await {
        Ok((status, message)) => (
            StatusCode::OK,
            Json(AnalysisStatusResponse {
                job_id: id,
                status,
                message,
            }),
        )
            .into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, "Analysis job not found"),
    }
}

/// GET /analysis/{id}/result: the raw report of a succeeded job.
pub async fn analysis_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.orchestrator.result(&id).await {
        Ok(report) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            report,
        )
            .into_response(),
        Err(DiveInError::NotReady { status, message }) => (
            StatusCode::CONFLICT,
            Json(AnalysisErrorResponse { status, message }),
        )
            .into_response(),
        Err(DiveInError::EmptyResult) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AnalysisErrorResponse {
                status: JobStatus::Succeeded,
                message: "Analysis result is empty".to_string(),
            }),
        )
            .into_response(),
        Err(DiveInError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Analysis job not found")
        }
        Err(e) => {
            tracing::error!("Failed to read result for {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read analysis result")
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// GET /history
pub async fn list_history(State(state): State<Arc<AppState>>) -> Response {
    match state.history.list().await {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => {
            tracing::error!("Failed to load history: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to load history")
        }
    }
}

/// DELETE /history
pub async fn clear_history(State(state): State<Arc<AppState>>) -> Response {
    match state.history.delete_all().await {
        Ok(()) => {
            tracing::info!("History cleared");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::error!("Failed to clear history: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to clear history")
        }
    }
}

/// GET /history/{id}
pub async fn get_history_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.history.get(&id).await {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => history_error(e, "History entry not found", "Failed to load history entry"),
    }
}

/// DELETE /history/{id}
pub async fn delete_history_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    if let Err(e) = state.history.get(&id).await {
        return history_error(e, "History entry not found", "Failed to load history entry");
    }

    match state.history.delete(&id).await {
        Ok(()) => {
            tracing::info!("History entry {} deleted", id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::error!("Failed to delete history entry {}: {:#}", id, e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete history entry",
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Exports
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResponse {
    pub format: String,
    pub filename: String,
    pub content_type: String,
}

/// POST /history/{id}/export: render and cache an export.
pub async fn create_export(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ExportRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid export request payload");
    };
    let format: ExportFormat = match req.format.parse() {
        Ok(format) => format,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &validation_message(e)),
    };

    let entry = match state.history.get(&id).await {
        Ok(entry) => entry,
        Err(e) => {
            return history_error(e, "History entry not found", "Failed to load history entry")
        }
    };

    let exported = match exports::generate(format, &entry) {
        Ok(exported) => exported,
        Err(e) => {
            tracing::error!("Failed to generate {} export for {}: {}", format, id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate export");
        }
    };

    if let Err(e) = state
        .history
        .write_export(&id, &exported.filename, &exported.data)
        .await
    {
        return history_error(e, "History entry not found", "Failed to store export");
    }

    (
        StatusCode::OK,
        Json(ExportResponse {
            format: exported.format.to_string(),
            filename: exported.filename,
            content_type: exported.content_type.to_string(),
        }),
    )
        .into_response()
}

/// GET /history/{id}/export/{format}: download a cached export.
pub async fn download_export(
    State(state): State<Arc<AppState>>,
    Path((id, format)): Path<(String, String)>,
) -> Response {
    let format: ExportFormat = match format.parse() {
        Ok(format) => format,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &validation_message(e)),
    };

    let filename = format.filename(&id);
    match state.history.read_export(&id, &filename).await {
        Ok(data) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, format.content_type().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename),
                ),
            ],
            data,
        )
            .into_response(),
        Err(e) => history_error(e, "Export not found", "Failed to read export"),
    }
}

// ---------------------------------------------------------------------------
// CI rules
// ---------------------------------------------------------------------------

/// POST /ci/rules
pub async fn create_ci_rules(payload: Result<Json<RulesRequest>, JsonRejection>) -> Response {
    let Ok(Json(req)) = payload else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid CI rules request payload");
    };

    match ci::generate_rules(&req) {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(DiveInError::Validation(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            tracing::error!("Failed to generate CI rules: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate CI rules")
        }
    }
}

/// The bare message of a validation error, without the display prefix.
fn validation_message(err: DiveInError) -> String {
    match err {
        DiveInError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
