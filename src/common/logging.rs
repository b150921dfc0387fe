//! Logging and tracing configuration
//!
//! Console logging for every command; scenario runs also tee into a log file
//! next to their screenshots so a failed CI run can be read after the fact.

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Name of the run log inside the artifacts directory
pub const RUN_LOG_NAME: &str = "harness.log";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("harness=info,warn"))
}

/// Initialize tracing for one-shot commands (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    tracing_subscriber::registry()
        .with(filter())
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

/// Initialize tracing for scenario runs (stderr + run log file)
///
/// Returns the guard that flushes the file writer; keep it alive until the
/// run finishes. Falls back to stderr only if the directory can't be created.
pub fn init_run(artifacts_dir: &Path) -> Option<(WorkerGuard, PathBuf)> {
    if std::fs::create_dir_all(artifacts_dir).is_err() {
        init_cli();
        return None;
    }

    let appender = tracing_appender::rolling::never(artifacts_dir, RUN_LOG_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact();

    tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Some((guard, artifacts_dir.join(RUN_LOG_NAME)))
}
