//! End-to-end orchestrator tests
//!
//! Real subprocess units (POSIX sh scripts), the real result file and the
//! real process environment. Each test uses its own handoff variable so the
//! shared environment does not couple tests running in parallel.
#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use finsight_core::application::{Orchestrator, OrchestratorConfig};
use finsight_core::domain::PredictionRequest;
use finsight_core::error::AppError;
use finsight_core::port::id_provider::SequentialIdProvider;
use finsight_core::port::{EnvStore, ExecutionError};
use finsight_infra_system::{FileResultExchange, ProcessEnv, ResultLayout, SubprocessUnitRunner};
use serde_json::json;
use tempfile::TempDir;

fn orchestrator(dir: &TempDir, handoff_var: &str, timeout: Duration, layout: ResultLayout) -> Arc<Orchestrator> {
    let config = OrchestratorConfig {
        definition: "unit.sh".into(),
        working_dir: dir.path().to_path_buf(),
        timeout,
        handoff_var: handoff_var.to_string(),
        strict_features: false,
    };
    Arc::new(Orchestrator::new(
        config,
        Arc::new(SubprocessUnitRunner::new("sh", vec![], vec!["PATH".to_string()])),
        Arc::new(FileResultExchange::new(dir.path(), "user_prediction.json", layout)),
        Arc::new(ProcessEnv),
        Arc::new(SequentialIdProvider::default()),
    ))
}

fn unit(dir: &TempDir, body: &str) {
    std::fs::write(dir.path().join("unit.sh"), body).unwrap();
}

fn request(income: i64) -> PredictionRequest {
    PredictionRequest::new(
        json!({"Income": income, "Age": 30, "Occupation": "Salaried"})
            .as_object()
            .cloned()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_round_trip_through_real_unit() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_ROUND_TRIP";
    unit(&dir, "printf '{\"prediction\": 42000.0}' > \"$USER_PREDICTION_PATH\"\n");
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::Fixed);

    let record = orch.run(request(60000)).await.unwrap();

    assert_eq!(record.get("prediction"), Some(&json!(42000.0)));
    assert!(record.elapsed_ms().unwrap() >= 0.0);
    assert!(!dir.path().join("user_prediction.json").exists());
    assert_eq!(ProcessEnv.get(var), None);
}

#[tokio::test]
async fn test_unit_sees_payload_in_its_environment() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_PAYLOAD";
    unit(
        &dir,
        &format!("printf '{{\"echo\": %s}}' \"${}\" > \"$USER_PREDICTION_PATH\"\n", var),
    );
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::Fixed);

    let record = orch.run(request(51000)).await.unwrap();

    assert_eq!(record.get("echo").unwrap()["Income"], json!(51000));
    assert_eq!(record.get("echo").unwrap()["Occupation"], json!("Salaried"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_serialized() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_CONCURRENT";
    // mkdir is atomic: a second unit running at the same time fails with exit 7
    unit(
        &dir,
        &format!(
            "mkdir running.lock || exit 7\nsleep 0.05\nprintf '{{\"echo\": %s}}' \"${}\" > \"$USER_PREDICTION_PATH\"\nrmdir running.lock\n",
            var
        ),
    );
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::Fixed);

    let mut handles = Vec::new();
    for income in 0..6 {
        let orch = orch.clone();
        handles.push(tokio::spawn(async move { (income, orch.run(request(income)).await) }));
    }

    for handle in handles {
        let (income, result) = handle.await.unwrap();
        let record = result.unwrap();
        // Each caller reads its own run's output, never a neighbour's
        assert_eq!(record.get("echo").unwrap()["Income"], json!(income));
    }
    assert_eq!(ProcessEnv.get(var), None);
}

#[tokio::test]
async fn test_timeout_restores_slot() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_TIMEOUT";
    ProcessEnv.set(var, "unrelated-state");
    unit(&dir, "sleep 10\n");
    let orch = orchestrator(&dir, var, Duration::from_millis(300), ResultLayout::Fixed);

    let err = orch.run(request(1)).await.unwrap_err();

    assert!(matches!(err, AppError::Execution(ExecutionError::Timeout(300))));
    assert_eq!(ProcessEnv.get(var).as_deref(), Some("unrelated-state"));
    ProcessEnv.remove(var);
}

#[tokio::test]
async fn test_fault_propagates_and_restores_absent_slot() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_FAULT";
    unit(
        &dir,
        "printf '{\"prediction\": 1}' > \"$USER_PREDICTION_PATH\"\necho 'NameError: model' >&2\nexit 1\n",
    );
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::Fixed);

    let err = orch.run(request(1)).await.unwrap_err();

    assert!(err.to_string().contains("NameError: model"));
    assert_eq!(ProcessEnv.get(var), None);
    // Partial output from the failed run is discarded with it
    assert!(!dir.path().join("user_prediction.json").exists());

    unit(&dir, "true\n");
    let record = orch.run(request(2)).await.unwrap();
    assert!(record.is_not_produced());
}

#[tokio::test]
async fn test_missing_definition_is_execution_failure() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_NO_DEFINITION";
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::Fixed);

    let err = orch.run(request(1)).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Execution(ExecutionError::DefinitionLoad(_))
    ));
    assert_eq!(ProcessEnv.get(var), None);
}

#[tokio::test]
async fn test_undeletable_stale_result_does_not_block_run() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_UNDELETABLE";
    // A non-empty directory at the result path cannot be unlinked
    std::fs::create_dir_all(dir.path().join("user_prediction.json").join("held")).unwrap();
    unit(&dir, "touch ran.marker\n");
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::Fixed);

    let _ = orch.run(request(1)).await;

    assert!(dir.path().join("ran.marker").exists());
    assert_eq!(ProcessEnv.get(var), None);
}

#[tokio::test]
async fn test_per_run_layout_round_trip() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_PER_RUN";
    unit(
        &dir,
        "case \"$USER_PREDICTION_PATH\" in */.runs/$FINSIGHT_RUN_ID/*) ;; *) exit 9 ;; esac\nprintf '{\"prediction\": 5}' > \"$USER_PREDICTION_PATH\"\n",
    );
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::PerRun);

    let record = orch.run(request(1)).await.unwrap();

    assert_eq!(record.get("prediction"), Some(&json!(5)));
    assert!(!dir.path().join(".runs").join("run-1").exists());
}

#[tokio::test]
async fn test_timed_out_unit_cannot_write_into_next_run() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_LATE_WRITER";
    unit(
        &dir,
        "sh -c 'sleep 1.5; printf \"{\\\"prediction\\\": \\\"from-run-1\\\"}\" > \"$USER_PREDICTION_PATH\"'\n",
    );
    let orch = orchestrator(&dir, var, Duration::from_secs(1), ResultLayout::Fixed);

    let err = orch.run(request(1)).await.unwrap_err();
    assert!(matches!(err, AppError::Execution(ExecutionError::Timeout(1000))));

    // Still running when the first unit's descendant would have written
    unit(&dir, "sleep 0.8\n");
    let record = orch.run(request(2)).await.unwrap();

    assert!(record.is_not_produced());
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!dir.path().join("user_prediction.json").exists());
}

#[tokio::test]
async fn test_failed_runs_leave_no_run_dirs() {
    let dir = TempDir::new().unwrap();
    let var = "FINSIGHT_E2E_PER_RUN_FAULT";
    unit(&dir, "printf '{}' > \"$USER_PREDICTION_PATH\"\nexit 1\n");
    let orch = orchestrator(&dir, var, Duration::from_secs(10), ResultLayout::PerRun);

    for income in 0..3 {
        assert!(orch.run(request(income)).await.is_err());
    }

    let runs = dir.path().join(".runs");
    let leftover: Vec<_> = std::fs::read_dir(&runs)
        .map(|entries| entries.flatten().map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert!(leftover.is_empty(), "leftover run dirs: {:?}", leftover);
}
