//! Finsight - Main Entry Point
//! HTTP dashboard + single-flight prediction runner

mod config;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use config::{DaemonConfig, LogFormat};
use finsight_api_http::HttpServer;
use finsight_core::application::Orchestrator;
use finsight_core::port::UuidProvider;
use finsight_infra_system::{FileResultExchange, ProcessEnv, SubprocessUnitRunner};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?.absolutize()?;

    // 2. Initialize logging
    let _log_guard = init_logging(&config)?;

    info!("Finsight v{} starting...", VERSION);
    info!(
        base_dir = %config.base_dir.display(),
        definition = %config.unit_definition.display(),
        command = %config.unit_command,
        timeout_secs = config.unit_timeout.as_secs(),
        result_layout = ?config.result_layout,
        strict_features = config.strict_features,
        "Configuration loaded"
    );

    if !config.unit_definition.exists() {
        tracing::warn!(
            path = %config.unit_definition.display(),
            "Unit definition not found; prediction requests will fail until it exists"
        );
    }

    // 3. Setup dependencies (DI wiring)
    let runner = Arc::new(SubprocessUnitRunner::new(
        config.unit_command.clone(),
        config.unit_args.clone(),
        config.env_allowlist.clone(),
    ));
    let results = Arc::new(FileResultExchange::new(
        config.base_dir.clone(),
        config.result_file.clone(),
        config.result_layout,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator(),
        runner,
        results,
        Arc::new(ProcessEnv),
        Arc::new(UuidProvider),
    ));

    // 4. Start HTTP server, wait for shutdown signal
    let server = HttpServer::new(config.http(), orchestrator);
    info!("✅ System ready. Press Ctrl+C to shutdown");

    server.run(shutdown_signal()).await?;

    info!("Shutdown complete.");
    Ok(())
}

/// Pretty or JSON console logging, plus a daily rolling file when
/// `FINSIGHT_LOG_DIR` is set.
fn init_logging(config: &DaemonConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = || {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("finsight=info,tower_http=info"))
    };

    let console = match config.log_format {
        // Production: JSON structured logging
        LogFormat::Json => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "finsight.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(env_filter()?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console.with_filter(env_filter()?))
        .with(file)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received. Exiting gracefully...");
}
