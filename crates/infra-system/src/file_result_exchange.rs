// Result Exchange File adapter
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use finsight_core::domain::ResultRecord;
use finsight_core::port::{ClearOutcome, ResultError, ResultExchange};

const RUNS_DIR: &str = ".runs";

/// Where each run's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultLayout {
    /// One well-known file shared by every run
    Fixed,
    /// `<base>/.runs/<run_id>/<file>`, removed after it is read
    PerRun,
}

impl std::str::FromStr for ResultLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(ResultLayout::Fixed),
            "per-run" | "per_run" => Ok(ResultLayout::PerRun),
            other => Err(format!("unknown result layout '{}' (expected fixed or per-run)", other)),
        }
    }
}

/// JSON result file on the local filesystem
pub struct FileResultExchange {
    base_dir: PathBuf,
    file_name: String,
    layout: ResultLayout,
}

impl FileResultExchange {
    pub fn new(base_dir: impl Into<PathBuf>, file_name: impl Into<String>, layout: ResultLayout) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_name: file_name.into(),
            layout,
        }
    }

    async fn remove_run_dir(&self, path: &Path) {
        if self.layout != ResultLayout::PerRun {
            return;
        }
        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::remove_dir(dir).await {
                debug!(dir = %dir.display(), error = %e, "Run directory not removed");
            }
        }
    }
}

#[async_trait]
impl ResultExchange for FileResultExchange {
    fn path_for(&self, run_id: &str) -> PathBuf {
        match self.layout {
            ResultLayout::Fixed => self.shared_path(),
            ResultLayout::PerRun => self.base_dir.join(RUNS_DIR).join(run_id).join(&self.file_name),
        }
    }

    fn shared_path(&self) -> PathBuf {
        self.base_dir.join(&self.file_name)
    }

    async fn clear(&self, path: &Path) -> ClearOutcome {
        if let Some(dir) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                return ClearOutcome::Failed(format!("cannot create {}: {}", dir.display(), e));
            }
        }

        remove(path).await
    }

    async fn read_once(&self, path: &Path) -> Result<ResultRecord, ResultError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.remove_run_dir(path).await;
                return Ok(ResultRecord::not_produced(&self.file_name));
            }
            Err(e) => {
                return Err(ResultError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Could not delete consumed result file");
        }
        self.remove_run_dir(path).await;

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| ResultError::Malformed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        match value {
            serde_json::Value::Object(map) => {
                debug!(path = %path.display(), keys = map.len(), "Result loaded");
                Ok(ResultRecord::new(map))
            }
            _ => Err(ResultError::NotAnObject {
                path: path.display().to_string(),
            }),
        }
    }

    async fn discard(&self, path: &Path) -> ClearOutcome {
        let outcome = remove(path).await;
        self.remove_run_dir(path).await;
        outcome
    }

    async fn modified(&self, path: &Path) -> Option<SystemTime> {
        tokio::fs::metadata(path).await.ok()?.modified().ok()
    }
}

async fn remove(path: &Path) -> ClearOutcome {
    match tokio::fs::remove_file(path).await {
        Ok(()) => ClearOutcome::Removed,
        Err(e) if e.kind() == ErrorKind::NotFound => ClearOutcome::Absent,
        Err(e) => ClearOutcome::Failed(e.to_string()),
    }
}
