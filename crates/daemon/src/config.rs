//! Daemon configuration
//!
//! Everything is read from `FINSIGHT_*` environment variables with defaults.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use finsight_api_http::HttpServerConfig;
use finsight_core::application::orchestrator::{
    DEFAULT_DEFINITION, DEFAULT_HANDOFF_VAR, DEFAULT_RESULT_FILE, DEFAULT_UNIT_TIMEOUT,
};
use finsight_core::application::OrchestratorConfig;
use finsight_infra_system::ResultLayout;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_UNIT_COMMAND: &str = "jupyter";
const DEFAULT_UNIT_ARGS: &str = "nbconvert --to notebook --execute --stdout {definition}";
const DEFAULT_ENV_ALLOWLIST: &str = "PATH,HOME,USER,LANG,PYTHONPATH,VIRTUAL_ENV,CONDA_PREFIX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    pub base_dir: PathBuf,
    pub unit_definition: PathBuf,
    pub unit_command: String,
    pub unit_args: Vec<String>,
    pub unit_timeout: Duration,
    pub env_allowlist: Vec<String>,
    pub result_file: String,
    pub result_layout: ResultLayout,
    pub handoff_var: String,
    pub strict_features: bool,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_dir = expand(&var("FINSIGHT_BASE_DIR").unwrap_or_else(|| ".".to_string()));
        let under_base = |key: &str, default: &str| -> PathBuf {
            let path = expand(&var(key).unwrap_or_else(|| default.to_string()));
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let port = match var("FINSIGHT_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("FINSIGHT_PORT must be a port number, got '{}'", raw))?,
            None => DEFAULT_PORT,
        };

        let unit_timeout = match var("FINSIGHT_UNIT_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.parse().with_context(|| {
                    format!("FINSIGHT_UNIT_TIMEOUT_SECS must be whole seconds, got '{}'", raw)
                })?;
                if secs == 0 {
                    return Err(anyhow!("FINSIGHT_UNIT_TIMEOUT_SECS must be greater than zero"));
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_UNIT_TIMEOUT,
        };

        let result_layout = match var("FINSIGHT_RESULT_LAYOUT") {
            Some(raw) => raw.parse::<ResultLayout>().map_err(|e| anyhow!(e))?,
            None => ResultLayout::Fixed,
        };

        let strict_features = match var("FINSIGHT_STRICT_FEATURES") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("FINSIGHT_STRICT_FEATURES must be true or false, got '{}'", raw))?,
            None => false,
        };

        let log_format = match var("FINSIGHT_LOG_FORMAT") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    return Err(anyhow!(
                        "FINSIGHT_LOG_FORMAT must be json or pretty, got '{}'",
                        raw
                    ))
                }
            },
            None => LogFormat::Pretty,
        };

        Ok(Self {
            host: var("FINSIGHT_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            unit_definition: under_base("FINSIGHT_UNIT_DEFINITION", DEFAULT_DEFINITION),
            unit_command: var("FINSIGHT_UNIT_COMMAND").unwrap_or_else(|| DEFAULT_UNIT_COMMAND.to_string()),
            unit_args: var("FINSIGHT_UNIT_ARGS")
                .unwrap_or_else(|| DEFAULT_UNIT_ARGS.to_string())
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            unit_timeout,
            env_allowlist: var("FINSIGHT_ENV_ALLOWLIST")
                .unwrap_or_else(|| DEFAULT_ENV_ALLOWLIST.to_string())
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            result_file: var("FINSIGHT_RESULT_FILE").unwrap_or_else(|| DEFAULT_RESULT_FILE.to_string()),
            result_layout,
            handoff_var: var("FINSIGHT_HANDOFF_VAR").unwrap_or_else(|| DEFAULT_HANDOFF_VAR.to_string()),
            strict_features,
            template_dir: under_base("FINSIGHT_TEMPLATE_DIR", "templates"),
            static_dir: under_base("FINSIGHT_STATIC_DIR", "static"),
            log_format,
            log_dir: var("FINSIGHT_LOG_DIR").map(|d| expand(&d)),
            base_dir,
        })
    }

    /// Make the base directory absolute so the unit (running in it) and the
    /// result reader agree on every relative path.
    pub fn absolutize(mut self) -> Result<Self> {
        if self.base_dir.is_relative() {
            let cwd = std::env::current_dir().context("cannot determine current directory")?;
            let rebase = |p: &Path| if p.is_relative() { cwd.join(p) } else { p.to_path_buf() };
            self.unit_definition = rebase(self.unit_definition.as_path());
            self.template_dir = rebase(self.template_dir.as_path());
            self.static_dir = rebase(self.static_dir.as_path());
            self.base_dir = rebase(self.base_dir.as_path());
        }
        Ok(self)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            definition: self.unit_definition.clone(),
            working_dir: self.base_dir.clone(),
            timeout: self.unit_timeout,
            handoff_var: self.handoff_var.clone(),
            strict_features: self.strict_features,
        }
    }

    pub fn http(&self) -> HttpServerConfig {
        HttpServerConfig {
            host: self.host.clone(),
            port: self.port,
            template_dir: self.template_dir.clone(),
            static_dir: self.static_dir.clone(),
        }
    }
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
