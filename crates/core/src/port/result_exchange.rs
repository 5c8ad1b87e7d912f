// Result Exchange Port
// Location the external unit writes its output to, read back after each run

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

use crate::domain::ResultRecord;

/// Outcome of a best-effort clear
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    Removed,
    Absent,
    /// Deletion failed; the caller logs it and carries on
    Failed(String),
}

#[derive(Error, Debug)]
pub enum ResultError {
    #[error("Failed to read result file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Result file {path} is not valid JSON: {message}")]
    Malformed { path: String, message: String },

    #[error("Result file {path} must contain a JSON object")]
    NotAnObject { path: String },
}

#[async_trait]
pub trait ResultExchange: Send + Sync {
    /// Where the unit must write its output for `run_id`
    fn path_for(&self, run_id: &str) -> PathBuf;

    /// The well-known shared location, cleared on dashboard refresh
    fn shared_path(&self) -> PathBuf;

    /// Remove any stale output at `path` (and prepare its directory). Never fails.
    async fn clear(&self, path: &Path) -> ClearOutcome;

    /// Read and consume the output at `path`.
    ///
    /// Returns `ResultRecord::not_produced` when nothing was written.
    async fn read_once(&self, path: &Path) -> Result<ResultRecord, ResultError>;

    /// Drop the output of a run without reading it, including any per-run
    /// directory. Never fails.
    async fn discard(&self, path: &Path) -> ClearOutcome;

    /// Last modification time of the output at `path`, if any
    async fn modified(&self, path: &Path) -> Option<SystemTime>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory result store keyed by path. Each entry keeps its write time.
    pub struct MemoryResultExchange {
        file_name: String,
        files: Mutex<HashMap<PathBuf, (serde_json::Value, SystemTime)>>,
        locked: Mutex<bool>,
        clears: Mutex<Vec<ClearOutcome>>,
    }

    impl MemoryResultExchange {
        pub fn new(file_name: impl Into<String>) -> Self {
            Self {
                file_name: file_name.into(),
                files: Mutex::new(HashMap::new()),
                locked: Mutex::new(false),
                clears: Mutex::new(Vec::new()),
            }
        }

        pub fn put(&self, path: impl Into<PathBuf>, value: serde_json::Value) {
            self.files
                .lock()
                .unwrap()
                .insert(path.into(), (value, SystemTime::now()));
        }

        pub fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }

        /// Simulate a file held open by another process
        pub fn set_locked(&self, locked: bool) {
            *self.locked.lock().unwrap() = locked;
        }

        pub fn clear_outcomes(&self) -> Vec<ClearOutcome> {
            self.clears.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResultExchange for MemoryResultExchange {
        fn path_for(&self, _run_id: &str) -> PathBuf {
            self.shared_path()
        }

        fn shared_path(&self) -> PathBuf {
            PathBuf::from(&self.file_name)
        }

        async fn clear(&self, path: &Path) -> ClearOutcome {
            let outcome = self.remove(path);
            self.clears.lock().unwrap().push(outcome.clone());
            outcome
        }

        async fn read_once(&self, path: &Path) -> Result<ResultRecord, ResultError> {
            match self.files.lock().unwrap().remove(path).map(|(value, _)| value) {
                Some(serde_json::Value::Object(map)) => Ok(ResultRecord::new(map)),
                Some(_) => Err(ResultError::NotAnObject {
                    path: path.display().to_string(),
                }),
                None => Ok(ResultRecord::not_produced(&self.file_name)),
            }
        }

        async fn discard(&self, path: &Path) -> ClearOutcome {
            self.remove(path)
        }

        async fn modified(&self, path: &Path) -> Option<SystemTime> {
            self.files.lock().unwrap().get(path).map(|(_, at)| *at)
        }
    }

    impl MemoryResultExchange {
        fn remove(&self, path: &Path) -> ClearOutcome {
            if *self.locked.lock().unwrap() {
                ClearOutcome::Failed("file is locked".to_string())
            } else if self.files.lock().unwrap().remove(path).is_some() {
                ClearOutcome::Removed
            } else {
                ClearOutcome::Absent
            }
        }
    }
}
