//! HTTP request handlers

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use finsight_core::application::Orchestrator;
use finsight_core::domain::{DashboardSnapshot, PredictionRequest, ResultRecord};
use finsight_core::error::AppError;
use tracing::info;

use crate::error::ApiError;
use crate::types::HealthResponse;

/// Shared application state
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub template_dir: PathBuf,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, template_dir: impl Into<PathBuf>) -> Self {
        Self {
            orchestrator,
            template_dir: template_dir.into(),
        }
    }

    async fn render(&self, page: &str) -> Result<Html<String>, ApiError> {
        let path = self.template_dir.join(page);
        match tokio::fs::read_to_string(&path).await {
            Ok(html) => Ok(Html(html)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ApiError::NotFound(format!("page {} not found", page)))
            }
            Err(e) => Err(ApiError::App(AppError::Io(e))),
        }
    }
}

/// GET /
pub async fn home(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    state.render("index.html").await
}

/// GET /input
pub async fn input_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    state.render("input.html").await
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        run_state: state.orchestrator.state(),
    })
}

/// GET /api/sample-dashboard
///
/// Drops any leftover prediction so the page starts from the sample profile.
pub async fn sample_dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.orchestrator.discard_stale_result().await;

    let snapshot = serde_json::to_value(DashboardSnapshot::sample())
        .map_err(|e| ApiError::Internal(format!("sample dashboard failed: {}", e)))?;
    Ok(Json(snapshot))
}

/// POST /api/run-notebook
pub async fn run_notebook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ResultRecord>, ApiError> {
    let request = PredictionRequest::from_body(&body).map_err(AppError::from)?;
    info!(fields = request.as_map().len(), "Received prediction request");

    // Detached so a dropped connection cannot cancel a run mid-flight
    let orchestrator = state.orchestrator.clone();
    let record = tokio::spawn(async move { orchestrator.run(request).await })
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task aborted: {}", e)))??;

    Ok(Json(record))
}
