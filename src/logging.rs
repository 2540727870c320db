use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "./logs/pfu.log";

/// `TRACING_LEVEL` wins over the per-mode default.
fn env_filter(default_level: &str) -> EnvFilter {
    let directives = env::var("TRACING_LEVEL").unwrap_or_else(|_| default_level.to_string());
    EnvFilter::new(directives)
}

/// Splits a log file path into the directory the appender writes in and the
/// file name inside it. A bare file name lands in the working directory.
fn split_log_path(path: &Path) -> (PathBuf, PathBuf) {
    let file_name = path
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pfu.log"));
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    (dir, file_name)
}

/// Coordinator logging: pretty events on stdout plus a plain copy in the log
/// file named by `LOG_FILE_PATH`. Keep the guard alive until exit so the
/// file writer flushes.
pub fn init_logger() -> WorkerGuard {
    let log_path = env::var("LOG_FILE_PATH").unwrap_or_else(|_| DEFAULT_LOG_FILE.to_string());
    let (log_dir, log_file) = split_log_path(Path::new(&log_path));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, &log_file));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .with(env_filter("info"))
        .init();

    info!("Logging to stdout and {}", log_dir.join(&log_file).display());
    guard
}

/// Worker processes own stdout for their report, so they log to stderr only
/// and leave the log file to the coordinator.
pub fn init_worker_logger() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .without_time()
                .with_target(false)
                .with_ansi(false),
        )
        .with(env_filter("warn"))
        .init();
}
