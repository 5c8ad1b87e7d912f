// Orchestrator - single-flight execution of the external unit

pub mod constants;
mod handoff;


pub use constants::*;
pub use handoff::{HandoffChannel, HandoffScope, HandoffSnapshot};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::domain::{PredictionRequest, ResultRecord, RunLifecycle, RunState};
use crate::error::{AppError, Result};
use crate::port::{ClearOutcome, EnvStore, IdProvider, Invocation, ResultExchange, UnitRunner};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Unit definition loaded on every run
    pub definition: PathBuf,
    /// Working directory the unit runs in
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub handoff_var: String,
    /// Reject requests with absent predictor features instead of passing them through
    pub strict_features: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            definition: PathBuf::from(DEFAULT_DEFINITION),
            working_dir: PathBuf::from("."),
            timeout: DEFAULT_UNIT_TIMEOUT,
            handoff_var: DEFAULT_HANDOFF_VAR.to_string(),
            strict_features: false,
        }
    }
}

/// Single-flight orchestrator
///
/// Owns the execution guard. Concurrent callers queue on it in FIFO order
/// (`tokio::sync::Mutex` is fair), so at most one unit run is in flight.
/// While the guard is held a run:
/// 1. clears stale output at its result path
/// 2. publishes the payload on the handoff slot (scoped, always restored)
/// 3. runs the unit exactly once
/// 4. reads its own output back, before the next run may clear it, or
///    discards it unread if the unit failed
///
/// Output that survived a failed clear is only accepted once the unit has
/// rewritten it.
pub struct Orchestrator {
    config: OrchestratorConfig,
    guard: Mutex<()>,
    handoff: HandoffChannel,
    runner: Arc<dyn UnitRunner>,
    results: Arc<dyn ResultExchange>,
    ids: Arc<dyn IdProvider>,
    state: watch::Sender<RunState>,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        runner: Arc<dyn UnitRunner>,
        results: Arc<dyn ResultExchange>,
        env: Arc<dyn EnvStore>,
        ids: Arc<dyn IdProvider>,
    ) -> Self {
        let handoff = HandoffChannel::new(env, config.handoff_var.clone());
        let (state, _) = watch::channel(RunState::Idle);
        Self {
            config,
            guard: Mutex::new(()),
            handoff,
            runner,
            results,
            ids,
            state,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn handoff(&self) -> &HandoffChannel {
        &self.handoff
    }

    /// State of the run currently holding the guard (`Idle` if none)
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    /// Run the external unit for `request` and return its result record with
    /// `elapsed_ms` attached.
    ///
    /// # Errors
    /// - AppError::Domain if strict feature checking is on and features are missing
    /// - AppError::Execution on definition-load, execution or timeout faults
    /// - AppError::Result if the unit wrote something that is not a JSON object
    pub async fn run(&self, request: PredictionRequest) -> Result<ResultRecord> {
        let started = Instant::now();
        let run_id = self.ids.generate_id();

        let missing = request.missing_features();
        if !missing.is_empty() {
            if self.config.strict_features {
                request.require_all_features()?;
            }
            warn!(
                run_id = %run_id,
                missing = ?missing.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
                "Prediction request is missing predictor features, passing through"
            );
        }

        let mut lifecycle = RunLifecycle::new(run_id.clone());
        lifecycle.advance(RunState::Acquiring)?;

        let guard = self.guard.lock().await;
        let _idle = IdleOnDrop(&self.state);
        debug!(
            run_id = %run_id,
            waited_ms = started.elapsed().as_millis() as u64,
            "Execution guard acquired"
        );

        let outcome = self.run_guarded(&request, &mut lifecycle).await;
        lifecycle.advance(RunState::Idle)?;
        drop(_idle);
        drop(guard);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match outcome {
            Ok(record) => {
                let record = record.with_elapsed_ms(elapsed_ms);
                info!(run_id = %run_id, elapsed_ms = %elapsed_ms, "Prediction run completed");
                Ok(record)
            }
            Err(e) => {
                error!(run_id = %run_id, elapsed_ms = %elapsed_ms, error = %e, "Prediction run failed");
                Err(e)
            }
        }
    }

    /// Body of a run. Caller holds the guard.
    async fn run_guarded(
        &self,
        request: &PredictionRequest,
        lifecycle: &mut RunLifecycle,
    ) -> Result<ResultRecord> {
        let run_id = lifecycle.run_id().to_string();
        let result_path = self.results.path_for(&run_id);
        let stale_stamp = match self.clear_logged(&result_path).await {
            ClearOutcome::Failed(_) => self.results.modified(&result_path).await,
            ClearOutcome::Removed | ClearOutcome::Absent => None,
        };

        let scope = match self.handoff.enter(request) {
            Ok(scope) => scope,
            Err(e) => {
                self.transition(lifecycle, RunState::Failed)?;
                return Err(AppError::Serialization(e));
            }
        };
        self.transition(lifecycle, RunState::PayloadSet)?;

        let invocation = Invocation {
            run_id: run_id.clone(),
            handoff_var: self.handoff.key().to_string(),
            payload_json: scope.payload_json().to_string(),
            definition: self.config.definition.clone(),
            working_dir: self.config.working_dir.clone(),
            result_path: result_path.clone(),
            timeout: self.config.timeout,
        };

        self.transition(lifecycle, RunState::Executing)?;
        info!(
            run_id = %run_id,
            definition = %invocation.definition.display(),
            timeout_ms = invocation.timeout.as_millis() as u64,
            "Starting unit execution"
        );
        let executed = self.runner.run(&invocation).await;
        drop(scope);

        match executed {
            Ok(outcome) => {
                self.transition(lifecycle, RunState::Succeeded)?;
                info!(
                    run_id = %run_id,
                    duration_ms = outcome.duration_ms,
                    exit_code = ?outcome.exit_code,
                    "Unit execution completed"
                );

                if stale_stamp.is_some()
                    && self.results.modified(&result_path).await == stale_stamp
                {
                    warn!(
                        run_id = %run_id,
                        path = %result_path.display(),
                        "Result file was not rewritten by this run, ignoring stale output"
                    );
                    self.discard_logged(&result_path).await;
                    return Ok(ResultRecord::not_produced(&file_label(&result_path)));
                }

                let record = self.results.read_once(&result_path).await?;
                if record.is_not_produced() {
                    warn!(run_id = %run_id, path = %result_path.display(), "Unit produced no result file");
                }
                Ok(record)
            }
            Err(e) => {
                self.transition(lifecycle, RunState::Failed)?;
                // Partial output of a failed run is never read
                self.discard_logged(&result_path).await;
                Err(AppError::Execution(e))
            }
        }
    }

    /// Drop whatever sits at the shared result path, unless a run is in
    /// flight (that run clears and consumes its own output).
    ///
    /// Returns `None` when the clear was skipped.
    pub async fn discard_stale_result(&self) -> Option<ClearOutcome> {
        let Ok(_guard) = self.guard.try_lock() else {
            debug!("Run in flight, leaving result file to its owner");
            return None;
        };
        let path = self.results.shared_path();
        Some(self.clear_logged(&path).await)
    }

    async fn clear_logged(&self, path: &Path) -> ClearOutcome {
        let outcome = self.results.clear(path).await;
        match &outcome {
            ClearOutcome::Removed => info!(path = %path.display(), "Deleted previous result file"),
            ClearOutcome::Absent => debug!(path = %path.display(), "No previous result file"),
            ClearOutcome::Failed(msg) => {
                warn!(path = %path.display(), error = %msg, "Could not delete previous result file")
            }
        }
        outcome
    }

    async fn discard_logged(&self, path: &Path) {
        match self.results.discard(path).await {
            ClearOutcome::Removed => debug!(path = %path.display(), "Discarded unread result"),
            ClearOutcome::Absent => {}
            ClearOutcome::Failed(msg) => {
                warn!(path = %path.display(), error = %msg, "Could not discard unread result")
            }
        }
    }

    fn transition(&self, lifecycle: &mut RunLifecycle, next: RunState) -> Result<()> {
        lifecycle.advance(next)?;
        self.state.send_replace(next);
        Ok(())
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Publishes `Idle` when the guard holder leaves, including on unwind
struct IdleOnDrop<'a>(&'a watch::Sender<RunState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(RunState::Idle);
    }
}
