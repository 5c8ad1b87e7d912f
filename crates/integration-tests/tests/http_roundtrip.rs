//! HTTP round trips against the full stack
//!
//! Router -> Orchestrator -> SubprocessUnitRunner -> result file.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use finsight_api_http::{HttpServer, HttpServerConfig};
use finsight_core::application::{Orchestrator, OrchestratorConfig};
use finsight_core::port::{EnvStore, UuidProvider};
use finsight_infra_system::{FileResultExchange, ProcessEnv, ResultLayout, SubprocessUnitRunner};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn router(dir: &TempDir, handoff_var: &str, timeout: Duration) -> Router {
    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig {
            definition: "unit.sh".into(),
            working_dir: dir.path().to_path_buf(),
            timeout,
            handoff_var: handoff_var.to_string(),
            strict_features: false,
        },
        Arc::new(SubprocessUnitRunner::new("sh", vec![], vec!["PATH".to_string()])),
        Arc::new(FileResultExchange::new(
            dir.path(),
            "user_prediction.json",
            ResultLayout::Fixed,
        )),
        Arc::new(ProcessEnv),
        Arc::new(UuidProvider),
    ));
    let config = HttpServerConfig {
        template_dir: dir.path().join("templates"),
        static_dir: dir.path().join("static"),
        ..Default::default()
    };
    HttpServer::new(config, orchestrator).router()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn predict(body: Value) -> Request<Body> {
    Request::post("/api/run-notebook")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_prediction_round_trip() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("unit.sh"),
        "printf '{\"prediction\": 42000.0}' > \"$USER_PREDICTION_PATH\"\n",
    )
    .unwrap();
    let router = router(&dir, "FINSIGHT_HTTP_ROUND_TRIP", Duration::from_secs(10));

    let (status, body) = send(
        &router,
        predict(json!({
            "Income": 60000, "Age": 30, "Dependents": 1,
            "Occupation_encoded": "1", "City_Tier_encoded": "1",
            "Total_Expenses": 25000, "Desired_Savings_Percentage": 15,
            "Disposable_Income": 35000, "Occupation": "Salaried", "City_Tier": "Tier 2"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let elapsed = body["elapsed_ms"].as_f64().unwrap();
    assert!(elapsed >= 0.0);
    assert_eq!(body, json!({"prediction": 42000.0, "elapsed_ms": elapsed}));
}

#[tokio::test]
async fn test_timeout_is_500_and_slot_restored() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_HTTP_TIMEOUT";
    std::fs::write(dir.path().join("unit.sh"), "sleep 10\n").unwrap();
    let router = router(&dir, var, Duration::from_millis(200));

    let (status, body) = send(&router, predict(json!({"Income": 1}))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("timed out"));
    assert_eq!(ProcessEnv.get(var), None);
}

#[tokio::test]
async fn test_dashboard_refresh_discards_prediction() {
    let dir = TempDir::new().unwrap();
    let router = router(&dir, "FINSIGHT_HTTP_DASHBOARD", Duration::from_secs(10));
    let result_path = dir.path().join("user_prediction.json");
    std::fs::write(&result_path, r#"{"prediction": 99}"#).unwrap();

    let request = Request::get("/api/sample-dashboard").body(Body::empty()).unwrap();
    let (status, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(!result_path.exists());
    assert_eq!(body["options"]["occupations"][0], json!("Salaried"));
    assert_eq!(body["charts"]["projection"]["months"][11], json!(12));
}
