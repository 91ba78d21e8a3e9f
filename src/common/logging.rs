//! Logging and tracing configuration
//!
//! The harness logs to stderr so stdout stays free for the report. The mock
//! runtime additionally logs to a file since its stdio carries the wire
//! protocol.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use super::paths;

/// Initialize tracing for the harness CLI
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies;
/// `verbose` raises the crate level to DEBUG so requested and observed
/// bounds of every iteration are printed.
pub fn init_cli(verbose: bool) {
    let default = if verbose {
        "bounds_harness=debug,warn"
    } else {
        "bounds_harness=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for the mock runtime (file + stderr logging)
///
/// The log file lives at `<data dir>/logs/mock-runtime.log`; without it the
/// runtime logs to stderr only.
pub fn init_runtime() -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bounds_harness=trace,mock_runtime=trace,info"));

    let (file, log_path) = match paths::log_dir().and_then(|dir| open_log_file(&dir)) {
        Some((file, path)) => (Some(file), Some(path)),
        None => (None, None),
    };

    runtime_subscriber(filter, file).init();
    log_path
}

/// Create the log directory and open `mock-runtime.log` for appending
fn open_log_file(log_dir: &Path) -> Option<(File, PathBuf)> {
    std::fs::create_dir_all(log_dir).ok()?;
    let log_file = log_dir.join("mock-runtime.log");
    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(file) => Some((file, log_file)),
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            None
        }
    }
}

/// Stderr logging plus, when a file is given, a detailed file log
fn runtime_subscriber(filter: EnvFilter, file: Option<File>) -> impl Subscriber + Send + Sync {
    let file_layer = file.map(|file| {
        fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .compact(),
        )
}
