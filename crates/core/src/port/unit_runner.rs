// Unit Runner Port
// Abstraction for driving the external computation unit to completion

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Everything the external unit needs for one run.
///
/// The payload travels inside the invocation rather than through shared
/// process state; runners hand it to the unit under `handoff_var`.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub run_id: String,
    pub handoff_var: String,
    pub payload_json: String,
    pub definition: PathBuf,
    pub working_dir: PathBuf,
    pub result_path: PathBuf,
    pub timeout: Duration,
}

/// Outcome of a unit run that exited cleanly
#[derive(Debug, Clone, Default)]
pub struct UnitOutcome {
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub stdout_tail: Option<String>,
    pub stderr_tail: Option<String>,
}

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Failed to load unit definition: {0}")]
    DefinitionLoad(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Unit execution failed (exit code {exit_code:?}): {message}")]
    Fault {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("Unit timed out after {0}ms")]
    Timeout(u64),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Unit Runner trait
///
/// Implementations:
/// - SubprocessUnitRunner: spawns the unit as a child process
/// - mocks::MockUnitRunner: scripted behaviour for tests
#[async_trait]
pub trait UnitRunner: Send + Sync {
    /// Run the unit once. No retries.
    ///
    /// # Errors
    /// - ExecutionError::DefinitionLoad if the definition cannot be read or parsed
    /// - ExecutionError::Fault if the unit raised or exited non-zero
    /// - ExecutionError::Timeout if the run exceeded `invocation.timeout`
    async fn run(&self, invocation: &Invocation) -> Result<UnitOutcome, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::port::result_exchange::mocks::MemoryResultExchange;

    /// Mock runner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Write the given JSON to the invocation's result path, then succeed.
        /// Goes to the attached `MemoryResultExchange` if any, else to disk.
        WriteResult(serde_json::Value),
        /// Succeed without writing anything
        Silent,
        /// Fail with an execution fault
        Fail(String),
        /// Sleep past the invocation timeout and report a timeout
        Hang,
        /// Panic inside the run
        Panic(String),
    }

    /// Mock Unit Runner
    ///
    /// Records every invocation, tracks how many runs overlap, and can be
    /// slowed down to widen race windows in concurrency tests.
    pub struct MockUnitRunner {
        behavior: Mutex<MockBehavior>,
        delay: std::time::Duration,
        invocations: Mutex<Vec<Invocation>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        observer: Mutex<Option<Arc<dyn Fn(&Invocation) + Send + Sync>>>,
        results: Option<Arc<MemoryResultExchange>>,
    }

    impl MockUnitRunner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                delay: std::time::Duration::ZERO,
                invocations: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                observer: Mutex::new(None),
                results: None,
            }
        }

        pub fn writing(value: serde_json::Value) -> Self {
            Self::new(MockBehavior::WriteResult(value))
        }

        pub fn failing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        /// Write results into `results` instead of the filesystem
        pub fn with_results(mut self, results: Arc<MemoryResultExchange>) -> Self {
            self.results = Some(results);
            self
        }

        pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Called at the start of every run, while the unit is "executing"
        pub fn on_run(self, observer: impl Fn(&Invocation) + Send + Sync + 'static) -> Self {
            *self.observer.lock().unwrap() = Some(Arc::new(observer));
            self
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            self.invocations.lock().unwrap().len()
        }

        pub fn invocations(&self) -> Vec<Invocation> {
            self.invocations.lock().unwrap().clone()
        }

        /// Highest number of simultaneously running invocations observed
        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl UnitRunner for MockUnitRunner {
        async fn run(&self, invocation: &Invocation) -> Result<UnitOutcome, ExecutionError> {
            self.invocations.lock().unwrap().push(invocation.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _in_flight = InFlight(&self.in_flight);

            let observer = self.observer.lock().unwrap().clone();
            if let Some(observer) = observer {
                observer(invocation);
            }

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let behavior = self.behavior.lock().unwrap().clone();
            match behavior {
                MockBehavior::WriteResult(value) => {
                    match &self.results {
                        Some(results) => results.put(invocation.result_path.clone(), value),
                        None => {
                            let body = serde_json::to_vec(&value)
                                .map_err(|e| ExecutionError::IoError(e.to_string()))?;
                            tokio::fs::write(&invocation.result_path, body)
                                .await
                                .map_err(|e| ExecutionError::IoError(e.to_string()))?;
                        }
                    }
                    Ok(UnitOutcome {
                        exit_code: Some(0),
                        ..Default::default()
                    })
                }
                MockBehavior::Silent => Ok(UnitOutcome {
                    exit_code: Some(0),
                    ..Default::default()
                }),
                MockBehavior::Fail(message) => Err(ExecutionError::Fault {
                    exit_code: Some(1),
                    message,
                }),
                MockBehavior::Hang => {
                    tokio::time::sleep(invocation.timeout).await;
                    Err(ExecutionError::Timeout(invocation.timeout.as_millis() as u64))
                }
                MockBehavior::Panic(message) => panic!("{}", message),
            }
        }
    }
}
