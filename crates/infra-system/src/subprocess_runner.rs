// Subprocess unit runner
// reason: async-trait, tokio for async process management
use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use finsight_core::port::unit_runner::{ExecutionError, Invocation, UnitOutcome, UnitRunner};

/// Placeholder in `args` replaced by the definition path
pub const DEFINITION_PLACEHOLDER: &str = "{definition}";

/// Variable carrying the result path into the unit
pub const RESULT_PATH_VAR: &str = "USER_PREDICTION_PATH";

/// Variable carrying the run id into the unit
pub const RUN_ID_VAR: &str = "FINSIGHT_RUN_ID";

/// Time between SIGTERM and SIGKILL on timeout (5 seconds)
pub const GRACEFUL_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes of stdout/stderr kept for diagnostics
const OUTPUT_TAIL_BYTES: usize = 4096;

/// Subprocess unit runner
/// Spawns the external unit with a cleared, allowlisted environment
pub struct SubprocessUnitRunner {
    program: String,
    args: Vec<String>,
    env_allowlist: Vec<String>,
}

impl SubprocessUnitRunner {
    /// Create a new subprocess runner
    ///
    /// # Arguments
    /// * `program` - Executable that runs a unit definition
    /// * `args` - Arguments; `{definition}` is replaced by the definition path
    /// * `env_allowlist` - Parent variables passed through to the unit
    ///
    /// # Example
    /// ```ignore
    /// let runner = SubprocessUnitRunner::new(
    ///     "jupyter",
    ///     vec!["nbconvert".into(), "--execute".into(), "{definition}".into()],
    ///     vec!["PATH".to_string(), "HOME".to_string()],
    /// );
    /// ```
    pub fn new(program: impl Into<String>, args: Vec<String>, env_allowlist: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env_allowlist,
        }
    }

    /// `jupyter nbconvert --to notebook --execute --stdout {definition}`
    pub fn notebook(env_allowlist: Vec<String>) -> Self {
        Self::new(
            "jupyter",
            ["nbconvert", "--to", "notebook", "--execute", "--stdout", DEFINITION_PLACEHOLDER]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            env_allowlist,
        )
    }

    /// Allowlisted variables from the parent environment
    fn inherited_env(&self) -> Vec<(String, String)> {
        self.env_allowlist
            .iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k.clone(), v)))
            .collect()
    }

    fn build_args(&self, definition: &Path) -> Vec<String> {
        let definition = definition.display().to_string();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(DEFINITION_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(DEFINITION_PLACEHOLDER, &definition)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(definition);
        }
        args
    }

    /// Verify the definition can be loaded before spawning anything.
    /// Notebook definitions must be JSON with a `cells` array.
    async fn load_definition(&self, invocation: &Invocation) -> Result<(), ExecutionError> {
        let path = resolve(&invocation.working_dir, &invocation.definition);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ExecutionError::DefinitionLoad(format!("{}: {}", path.display(), e)))?;

        if path.extension().and_then(|e| e.to_str()) == Some("ipynb") {
            let notebook: serde_json::Value = serde_json::from_str(&source).map_err(|e| {
                ExecutionError::DefinitionLoad(format!("{}: {}", path.display(), e))
            })?;
            let cells = notebook
                .get("cells")
                .and_then(|c| c.as_array())
                .ok_or_else(|| {
                    ExecutionError::DefinitionLoad(format!(
                        "{}: notebook has no cells array",
                        path.display()
                    ))
                })?;
            info!(path = %path.display(), cells = cells.len(), "Notebook loaded");
        } else {
            debug!(path = %path.display(), bytes = source.len(), "Unit definition loaded");
        }
        Ok(())
    }

    fn spawn(&self, invocation: &Invocation) -> Result<Child, ExecutionError> {
        let args = self.build_args(&invocation.definition);
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .env_clear()
            .envs(self.inherited_env())
            .env(&invocation.handoff_var, &invocation.payload_json)
            .env(RESULT_PATH_VAR, &invocation.result_path)
            .env(RUN_ID_VAR, &invocation.run_id)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The guard is released if the caller is dropped; the unit must not outlive it
            .kill_on_drop(true);

        // Own process group, so kernels and other descendants can be signalled with the unit
        #[cfg(unix)]
        {
            command.process_group(0);
        }

        command
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(format!("{}: {}", self.program, e)))
    }

    /// Wait for the child within the invocation's timeout
    async fn wait(
        &self,
        child: &mut Child,
        group: Option<u32>,
        limit: Duration,
    ) -> Result<ExitStatus, ExecutionError> {
        match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => Err(ExecutionError::IoError(e.to_string())),
            Err(_) => {
                self.terminate(child, group).await;
                Err(ExecutionError::Timeout(limit.as_millis() as u64))
            }
        }
    }

    /// SIGTERM to the unit's process group first, then SIGKILL
    async fn terminate(&self, child: &mut Child, group: Option<u32>) {
        #[cfg(unix)]
        {
            if let Some(pgid) = group {
                use nix::sys::signal::Signal;

                info!(pgid = %pgid, "Sending SIGTERM to timed-out unit");
                match signal_group(pgid, Signal::SIGTERM) {
                    Err(e) => warn!(pgid = %pgid, error = %e, "SIGTERM failed"),
                    Ok(()) => match timeout(GRACEFUL_KILL_TIMEOUT, child.wait()).await {
                        Ok(_) => info!(pgid = %pgid, "Unit exited after SIGTERM"),
                        Err(_) => {
                            warn!(pgid = %pgid, "Unit did not exit after SIGTERM, sending SIGKILL")
                        }
                    },
                }
                // Descendants that outlived or ignored SIGTERM go too
                sweep_group(Some(pgid));
                if let Err(e) = child.wait().await {
                    warn!(pgid = %pgid, error = %e, "Failed to reap unit");
                }
                return;
            }
        }

        if let Err(e) = child.kill().await {
            warn!(error = %e, "Failed to kill unit");
        }
    }
}

/// SIGKILL whatever is left of the unit's process group
fn sweep_group(group: Option<u32>) {
    #[cfg(unix)]
    {
        if let Some(pgid) = group {
            match signal_group(pgid, nix::sys::signal::Signal::SIGKILL) {
                Ok(()) => debug!(pgid = %pgid, "Killed leftover unit processes"),
                Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => warn!(pgid = %pgid, error = %e, "Failed to kill unit process group"),
            }
        }
    }
    #[cfg(not(unix))]
    let _ = group;
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pgid as i32), signal)
}

#[async_trait]
impl UnitRunner for SubprocessUnitRunner {
    async fn run(&self, invocation: &Invocation) -> Result<UnitOutcome, ExecutionError> {
        self.load_definition(invocation).await?;

        let started = Instant::now();
        info!(
            run_id = %invocation.run_id,
            program = %self.program,
            working_dir = %invocation.working_dir.display(),
            timeout_ms = invocation.timeout.as_millis() as u64,
            "Spawning unit"
        );

        let mut child = self.spawn(invocation)?;
        let group = child.id();
        let stdout = child.stdout.take().map(capture_tail);
        let stderr = child.stderr.take().map(capture_tail);

        let waited = self.wait(&mut child, group, invocation.timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        // Nothing the unit started may write results after the run is over
        sweep_group(group);

        let status = match waited {
            Ok(status) => status,
            Err(e) => {
                // Grandchildren may still hold the pipes open
                for task in [stdout, stderr].into_iter().flatten() {
                    task.abort();
                }
                return Err(e);
            }
        };

        let stdout_tail = collect_tail(stdout).await;
        let stderr_tail = collect_tail(stderr).await;

        info!(
            run_id = %invocation.run_id,
            duration_ms = %duration_ms,
            exit_code = ?status.code(),
            "Unit exited"
        );

        if !status.success() {
            let message = stderr_tail
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .and_then(|s| s.lines().last())
                .unwrap_or("unit exited with failure status")
                .to_string();
            return Err(ExecutionError::Fault {
                exit_code: status.code(),
                message,
            });
        }

        Ok(UnitOutcome {
            duration_ms,
            exit_code: status.code(),
            stdout_tail,
            stderr_tail,
        })
    }
}

fn resolve(working_dir: &Path, definition: &Path) -> std::path::PathBuf {
    if definition.is_absolute() {
        definition.to_path_buf()
    } else {
        working_dir.join(definition)
    }
}

/// Drain a pipe in the background, keeping only the last bytes
fn capture_tail<R>(mut reader: R) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut tail: Vec<u8> = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    tail.extend_from_slice(&buf[..n]);
                    if tail.len() > OUTPUT_TAIL_BYTES {
                        let excess = tail.len() - OUTPUT_TAIL_BYTES;
                        tail.drain(..excess);
                    }
                }
            }
        }
        String::from_utf8_lossy(&tail).to_string()
    })
}

async fn collect_tail(task: Option<JoinHandle<String>>) -> Option<String> {
    match task {
        Some(task) => timeout(Duration::from_secs(1), task).await.ok()?.ok(),
        None => None,
    }
}
