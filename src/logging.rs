//! Tracing setup for the ingest and answering commands.
//!
//! Events always go to stdout in compact form. A file sink is added on top: the target is
//! taken from `CHECKLIST_RAG_LOG_FILE` when set, falling back to `logs/checklist-rag.log`.
//! File writes go through a background worker so that the answer scheduler's concurrent
//! batches never block on log I/O.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`, with `info` as the default. The stdout layer stays
/// ANSI-colored and target-free; the file layer, when one can be opened, records targets
/// and strips ANSI codes. Call this once at process start, before any spans are entered.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    if let Some(writer) = configure_file_writer() {
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact();

        registry.with(file_layer).init();
    } else {
        registry.init();
    }
}

/// Open the file sink and wrap it in a background writer.
///
/// The worker guard is parked in a process-wide `OnceLock` so buffered events are flushed
/// on shutdown. Returns `None` when the file (or the fallback `logs/` directory) cannot be
/// opened; the caller then runs with stdout only.
fn configure_file_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("CHECKLIST_RAG_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            std::fs::create_dir_all("logs")
                .map_err(|err| eprintln!("Failed to create logs directory: {err}"))
                .ok()?;
            let appender = tracing_appender::rolling::never("logs", "checklist-rag.log");
            tracing_appender::non_blocking(appender)
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
