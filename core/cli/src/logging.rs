//! File logging for the CLI.
//!
//! Stdout belongs to command output, so diagnostics go to a daily-rolled file
//! under `~/.seeme/logs`. Logging is best effort: if the directory can't be
//! created the CLI runs without it.

use seeme_core::StorageConfig;
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEBUG_ENV: &str = "SEEME_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "seeme-cli.log";

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let logs_dir = storage.logs_dir();
    if fs_err::create_dir_all(&logs_dir).is_err() {
        return None;
    }

    let appender = tracing_appender::rolling::daily(&logs_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let subscriber = tracing_subscriber::registry().with(filter()).with(
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(false),
    );
    if subscriber.try_init().is_err() {
        return None;
    }
    Some(guard)
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
