//! EcoSort - waste classification API.
//!
//! This is the main binary: it reads configuration from flags and the
//! environment, sets up logging, validates the configuration, and serves the
//! HTTP API until interrupted.

use std::panic;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ecosort_app::cli::Args;
use ecosort_core::service::ClassificationService;
use ecosort_server::Server;

/// Initialize logging: console plus daily rolling files when the log
/// directory is usable.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = args.effective_log_level();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ecosort={},tower_http={},warn", log_level, log_level)));

    if let Some(log_dir) = args.logs_dir() {
        if let Some(appender) = file_appender(&log_dir) {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stdout))
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();

            tracing::info!("Logging to {:?}", log_dir);
            return Some(guard);
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn file_appender(log_dir: &Path) -> Option<RollingFileAppender> {
    std::fs::create_dir_all(log_dir).ok()?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(7)
        .filename_prefix("ecosort")
        .filename_suffix("log")
        .build(log_dir)
        .ok()
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Keep guard alive for the duration of the program
    let _log_guard = init_logging(&args);

    // Set up panic hook to log panics to file
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        tracing::error!("PANIC: {}", panic_info);
        default_hook(panic_info);
    }));

    let config = args.core_config().context("invalid configuration")?;
    let server_config = args.server_config();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        auth_enabled = config.auth_enabled(),
        rate_limit_per_minute = config.limits.requests_per_window,
        max_file_bytes = config.limits.max_file_bytes,
        max_text_chars = config.limits.max_text_chars,
        metrics = server_config.enable_metrics,
        "Starting EcoSort"
    );
    if !config.auth_enabled() {
        tracing::warn!("No API key configured, classification endpoints are open");
    }

    let service =
        ClassificationService::from_config(&config).context("invalid configuration")?;
    let server = Server::new(server_config, service).context("failed to create server")?;

    server
        .run_until(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("EcoSort stopped");
    Ok(())
}
