use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::utils::error::{BotError, Result};

/// Maps the configured `log_level` (DEBUG/INFO/WARNING/ERROR/CRITICAL) to a
/// tracing level directive.
pub fn level_directive(log_level: &str) -> &'static str {
    match log_level.to_ascii_uppercase().as_str() {
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

fn build_filter(log_level: &str, verbose: bool) -> EnvFilter {
    let level = if verbose {
        "debug"
    } else {
        level_directive(log_level)
    };
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("steam_idle_bot={},warn", level)))
}

pub fn init_cli_logger(
    log_level: &str,
    verbose: bool,
    log_file: Option<&str>,
    json: bool,
) -> Result<()> {
    let console = if json {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .compact()
            .boxed()
    };

    // 日誌檔案不使用 ANSI 色碼
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(BotError::IoError)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(log_level, verbose))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| BotError::config(format!("Failed to initialise logging: {}", e)))?;

    tracing::info!("Steam Idle Bot starting...");
    tracing::debug!("Logging level: {}", log_level);
    if let Some(path) = log_file {
        tracing::debug!("Log file: {}", path);
    }
    Ok(())
}

/// Minimal logger for helper binaries.
pub fn init_tool_logger(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("steam_idle_bot=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("steam_idle_bot=warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}
