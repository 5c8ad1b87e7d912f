//! HTTP Server

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use finsight_core::application::Orchestrator;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handler::{self, AppState};

const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
const DEFAULT_HTTP_PORT: u16 = 8000;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            template_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl HttpServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Build the application router
pub fn build_router(state: Arc<AppState>, static_dir: impl Into<PathBuf>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handler::home))
        .route("/input", get(handler::input_page))
        .route("/health", get(handler::health))
        .route("/api/sample-dashboard", get(handler::sample_dashboard))
        .route("/api/run-notebook", post(handler::run_notebook))
        .nest_service("/static", ServeDir::new(static_dir.into()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// HTTP Server
pub struct HttpServer {
    config: HttpServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, orchestrator: Arc<Orchestrator>) -> Self {
        let state = Arc::new(AppState::new(orchestrator, config.template_dir.clone()));
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.config.static_dir.clone())
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!("Server listening on http://{}", addr);
        info!("API endpoints:");
        info!("  GET  /                     - Dashboard");
        info!("  GET  /input                - Profile input form");
        info!("  GET  /health               - Health check");
        info!("  GET  /api/sample-dashboard - Sample dashboard payload");
        info!("  POST /api/run-notebook     - Run a prediction");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use finsight_core::application::OrchestratorConfig;
    use finsight_core::port::env_store::mocks::MemoryEnvStore;
    use finsight_core::port::id_provider::SequentialIdProvider;
    use finsight_core::port::unit_runner::mocks::{MockBehavior, MockUnitRunner};
    use finsight_infra_system::{FileResultExchange, ResultLayout};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        dir: TempDir,
        router: Router,
    }

    fn harness(runner: MockUnitRunner) -> Harness {
        let dir = TempDir::new().unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(runner),
            Arc::new(FileResultExchange::new(
                dir.path(),
                "user_prediction.json",
                ResultLayout::Fixed,
            )),
            Arc::new(MemoryEnvStore::new()),
            Arc::new(SequentialIdProvider::default()),
        ));
        std::fs::write(dir.path().join("index.html"), "<h1>Dashboard</h1>").unwrap();
        let state = Arc::new(AppState::new(orchestrator, dir.path()));
        let router = build_router(state, dir.path().join("static"));
        Harness { dir, router }
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(body: &str) -> Request<Body> {
        Request::post("/api/run-notebook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_run_notebook_returns_result_with_elapsed() {
        let h = harness(MockUnitRunner::writing(json!({"prediction": 42000.0})));

        let (status, body) = call(&h.router, post(r#"{"Income": 60000}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], json!(42000.0));
        assert!(body["elapsed_ms"].as_f64().unwrap() >= 0.0);
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_result_is_200_with_error() {
        let h = harness(MockUnitRunner::new(MockBehavior::Silent));

        let (status, body) = call(&h.router, post("{}")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["error"], json!("user_prediction.json not produced"));
        assert!(body["elapsed_ms"].is_number());
    }

    #[tokio::test]
    async fn test_execution_fault_is_500() {
        let h = harness(MockUnitRunner::failing("KeyError: 'Income'"));

        let (status, body) = call(&h.router, post("")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("KeyError"));
    }

    #[tokio::test]
    async fn test_panicking_run_is_500_and_server_keeps_serving() {
        let h = harness(MockUnitRunner::new(MockBehavior::Panic("kernel died".to_string())));

        let (status, body) = call(&h.router, post("{}")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("prediction task aborted"));

        let (status, body) = call(&h.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_state"], json!("IDLE"));
    }

    #[tokio::test]
    async fn test_non_object_body_is_400() {
        let h = harness(MockUnitRunner::new(MockBehavior::Silent));

        let (status, body) = call(&h.router, post("[1, 2, 3]")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_sample_dashboard_is_stable_and_clears_result() {
        let h = harness(MockUnitRunner::new(MockBehavior::Silent));
        let result_path = h.dir.path().join("user_prediction.json");

        std::fs::write(&result_path, r#"{"prediction": 1}"#).unwrap();
        let (status, first) = call(&h.router, get("/api/sample-dashboard")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!result_path.exists());

        std::fs::write(&result_path, r#"{"prediction": 2}"#).unwrap();
        let (_, second) = call(&h.router, get("/api/sample-dashboard")).await;
        assert!(!result_path.exists());

        assert_eq!(first, second);
        assert_eq!(first["sample_profile"]["Income"], json!(60000.0));
    }

    #[tokio::test]
    async fn test_pages_and_health() {
        let h = harness(MockUnitRunner::new(MockBehavior::Silent));

        let response = h.router.clone().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (status, body) = call(&h.router, get("/input")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], json!("page input.html not found"));

        let (status, body) = call(&h.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "run_state": "IDLE"}));
    }
}
