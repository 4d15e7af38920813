pub mod health;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::daemon::orchestrator::Orchestrator;
use crate::models::DaemonConfig;
use crate::storage::HistoryStore;

/// Shared application state for the Axum server.
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub history: Arc<dyn HistoryStore>,
    pub config: Arc<DaemonConfig>,
    pub start_time: Instant,
}

/// Create the Axum router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/checkdive", get(routes::check_dive))
        .route("/analyze", post(routes::analyze))
        .route("/analysis/{id}/status", get(routes::analysis_status))
        .route("/analysis/{id}/result", get(routes::analysis_result))
        .route(
            "/history",
            get(routes::list_history).delete(routes::clear_history),
        )
        .route(
            "/history/{id}",
            get(routes::get_history_entry).delete(routes::delete_history_entry),
        )
        .route("/history/{id}/export", post(routes::create_export))
        .route("/history/{id}/export/{format}", get(routes::download_export))
        .route("/ci/rules", post(routes::create_ci_rules))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::analyzer::AnalysisRunner;
    use crate::daemon::registry::JobRegistry;
    use crate::errors::DiveInError;
    use crate::models::{HistoryEntry, JobStatus, Metadata, SourceKind};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration as ChronoDuration, Utc};
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    const REPORT: &str = r#"{"image":{"sizeBytes":100,"inefficientBytes":10,"efficiencyScore":0.9,"fileReference":[{"count":1,"sizeBytes":60,"file":"/bin/sh"}]}}"#;

    // -----------------------------------------------------------------------
    // InMemoryHistoryStore - test double
    // -----------------------------------------------------------------------

    #[derive(Default)]
    struct InMemoryHistoryStore {
        entries: RwLock<Vec<HistoryEntry>>,
        exports: RwLock<HashMap<(String, String), Vec<u8>>>,
    }

    fn missing(id: &str) -> anyhow::Error {
        DiveInError::NotFound(format!("History entry '{}' not found", id)).into()
    }

    #[async_trait]
    impl HistoryStore for InMemoryHistoryStore {
        async fn save(&self, entry: &HistoryEntry) -> anyhow::Result<()> {
            let mut entries = self.entries.write().await;
            entries.retain(|e| e.metadata.id != entry.metadata.id);
            entries.push(entry.clone());
            Ok(())
        }

        async fn list(&self) -> anyhow::Result<Vec<Metadata>> {
            let mut list: Vec<Metadata> = self
                .entries
                .read()
                .await
                .iter()
                .map(|e| e.metadata.clone())
                .collect();
            list.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
            Ok(list)
        }

        async fn get(&self, id: &str) -> anyhow::Result<HistoryEntry> {
            self.entries
                .read()
                .await
                .iter()
                .find(|e| e.metadata.id == id)
                .cloned()
                .ok_or_else(|| missing(id))
        }

        async fn delete(&self, id: &str) -> anyhow::Result<()> {
            self.entries.write().await.retain(|e| e.metadata.id != id);
            self.exports.write().await.retain(|(entry, _), _| entry != id);
            Ok(())
        }

        async fn delete_all(&self) -> anyhow::Result<()> {
            self.entries.write().await.clear();
            self.exports.write().await.clear();
            Ok(())
        }

        async fn write_export(&self, id: &str, filename: &str, data: &[u8]) -> anyhow::Result<()> {
            self.get(id).await?;
            self.exports
                .write()
                .await
                .insert((id.to_string(), filename.to_string()), data.to_vec());
            Ok(())
        }

        async fn read_export(&self, id: &str, filename: &str) -> anyhow::Result<Vec<u8>> {
            self.exports
                .read()
                .await
                .get(&(id.to_string(), filename.to_string()))
                .cloned()
                .ok_or_else(|| {
                    DiveInError::NotFound(format!("Export '{}' not found", filename)).into()
                })
        }
    }

    // -----------------------------------------------------------------------
    // StubRunner - test double
    // -----------------------------------------------------------------------

    struct StubRunner {
        report: Option<&'static str>,
        available: bool,
    }

    #[async_trait]
    impl AnalysisRunner for StubRunner {
        async fn run(
            &self,
            _source: SourceKind,
            _target: &str,
            _timeout: Duration,
        ) -> Result<Vec<u8>, DiveInError> {
            match self.report {
                Some(report) => Ok(report.as_bytes().to_vec()),
                None => Err(DiveInError::Tool("Dive failed: image not found".to_string())),
            }
        }

        fn is_available(&self) -> bool {
            self.available
        }
    }

    fn setup_with(runner: StubRunner) -> (Router, Arc<AppState>, Arc<InMemoryHistoryStore>) {
        let history = Arc::new(InMemoryHistoryStore::default());
        let history_dyn: Arc<dyn HistoryStore> = history.clone();
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(JobRegistry::new()),
            Arc::clone(&history_dyn),
            Arc::new(runner),
            Duration::from_secs(5),
        ));
        let state = Arc::new(AppState {
            orchestrator,
            history: history_dyn,
            config: Arc::new(DaemonConfig::default()),
            start_time: Instant::now(),
        });
        (create_router(Arc::clone(&state)), state, history)
    }

    fn setup() -> (Router, Arc<AppState>, Arc<InMemoryHistoryStore>) {
        setup_with(StubRunner {
            report: Some(REPORT),
            available: true,
        })
    }

    fn sample_entry(id: &str, offset_secs: i64) -> HistoryEntry {
        let completed = Utc::now() + ChronoDuration::seconds(offset_secs);
        HistoryEntry::new(id, "alpine:latest", "docker", completed, completed, REPORT.as_bytes())
            .expect("entry")
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes()
            .to_vec()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).expect("json body")
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    async fn wait_terminal(state: &AppState, id: &str) -> JobStatus {
        for _ in 0..200 {
            let (status, _) = state.orchestrator.status(id).await.expect("status");
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never reached a terminal state", id);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, history) = setup();
        history.save(&sample_entry("a", 0)).await.expect("save");

        let response = app.oneshot(empty_request("GET", "/health")).await.expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["historyEntries"], 1);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_checkdive_installed_and_missing() {
        let (app, _, _) = setup();
        let response = app.oneshot(empty_request("GET", "/checkdive")).await.expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Dive is installed");

        let (app, _, _) = setup_with(StubRunner {
            report: None,
            available: false,
        });
        let response = app.oneshot(empty_request("GET", "/checkdive")).await.expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Dive is not found");
    }

    #[tokio::test]
    async fn test_analyze_then_result() {
        let (app, state, history) = setup();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/analyze",
                r#"{"source":"docker","image":"alpine:latest"}"#,
            ))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "queued");
        let job_id = body["jobId"].as_str().expect("jobId").to_string();

        assert_eq!(wait_terminal(&state, &job_id).await, JobStatus::Succeeded);

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/analysis/{}/status", job_id)))
            .await
            .expect("send");
        let body = body_json(response).await;
        assert_eq!(body["status"], "succeeded");
        assert!(body.get("message").is_none());

        let response = app
            .oneshot(empty_request("GET", &format!("/analysis/{}/result", job_id)))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, REPORT.as_bytes());

        // History save happens just after the terminal transition.
        for _ in 0..100 {
            if !history.list().await.expect("list").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(history.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_validation_errors() {
        let (app, state, _) = setup();

        let response = app
            .clone()
            .oneshot(json_request("POST", "/analyze", r#"{"source":"docker","image":"  "}"#))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Image reference is required for Docker source"
        );

        let response = app
            .clone()
            .oneshot(json_request("POST", "/analyze", r#"{"source":"podman","image":"x"}"#))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request("POST", "/analyze", "{not json"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Invalid analyze request payload"
        );

        assert!(state.orchestrator.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_job_status_and_result_conflict() {
        let (app, state, history) = setup_with(StubRunner {
            report: None,
            available: true,
        });
        let handle = state
            .orchestrator
            .submit(&crate::models::AnalyzeRequest {
                image: "missing:tag".to_string(),
                source: "docker".to_string(),
                archive_path: None,
            })
            .await
            .expect("submit");
        handle.join_handle.await.expect("join");

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/analysis/{}/status", handle.job_id)))
            .await
            .expect("send");
        let body = body_json(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["message"], "Dive failed: image not found");

        let response = app
            .oneshot(empty_request("GET", &format!("/analysis/{}/result", handle.job_id)))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["status"], "failed");
        assert_eq!(body["message"], "Dive failed: image not found");
        assert!(history.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let (app, _, _) = setup();
        let response = app
            .clone()
            .oneshot(empty_request("GET", "/analysis/nope/status"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Analysis job not found");

        let response = app
            .oneshot(empty_request("GET", "/analysis/nope/result"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_list_get_delete() {
        let (app, _, history) = setup();
        history.save(&sample_entry("old", 0)).await.expect("save");
        history.save(&sample_entry("new", 10)).await.expect("save");

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/history"))
            .await
            .expect("send");
        let body = body_json(response).await;
        let ids: Vec<&str> = body
            .as_array()
            .expect("array")
            .iter()
            .map(|m| m["id"].as_str().expect("id"))
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(body[0]["summary"]["sizeBytes"], 100);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/history/old"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["metadata"]["id"], "old");
        assert_eq!(body["result"]["image"]["inefficientBytes"], 10);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", "/history/old"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", "/history/old"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", "/history"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(history.list().await.expect("list").is_empty());

        let response = app
            .oneshot(empty_request("GET", "/history/new"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "History entry not found");
    }

    #[tokio::test]
    async fn test_export_create_and_download() {
        let (app, _, history) = setup();
        history.save(&sample_entry("e1", 0)).await.expect("save");

        let response = app
            .clone()
            .oneshot(json_request("POST", "/history/e1/export", r#"{"format":"CSV"}"#))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["format"], "csv");
        assert_eq!(body["filename"], "dive-export-e1.csv");
        assert_eq!(body["contentType"], "text/csv");

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/history/e1/export/csv"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/csv");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"dive-export-e1.csv\""
        );
        let text = String::from_utf8(body_bytes(response).await).expect("utf8");
        assert!(text.starts_with("category,name,sizeBytes,count,value\n"));
        assert!(text.contains("file,/bin/sh,60,1,"));

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/history/e1/export/html"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Export not found");

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/history/e1/export/pdf"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request("POST", "/history/zzz/export", r#"{"format":"json"}"#))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ci_rules() {
        let (app, _, _) = setup();
        let response = app
            .clone()
            .oneshot(json_request("POST", "/ci/rules", r#"{"lowestEfficiency":0.95}"#))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["filename"], ".dive-ci");
        assert_eq!(body["content"], "rules:\n  lowestEfficiency: 0.95\n");

        let response = app
            .oneshot(json_request("POST", "/ci/rules", "{}"))
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "at least one rule threshold is required"
        );
    }
}
