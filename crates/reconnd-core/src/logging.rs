//! Tracing setup for the daemon.
//!
//! Events go to `~/.local/state/reconnd/reconnd.log` when that file can be
//! opened, otherwise to stderr. Thread names are always included, since the
//! timer thread and the reconnection workers are told apart by name.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,reconnd=debug,reconnd_core=debug";
const LOG_FILE: &str = "reconnd.log";

/// `RUST_LOG` if set and valid, else [`DEFAULT_FILTER`].
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn install(writer: BoxMakeWriter) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_thread_names(true)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {}", e))
}

fn log_file_path() -> Result<PathBuf> {
    let state_dir = xdg::BaseDirectories::with_prefix("reconnd")?.get_state_home();
    fs::create_dir_all(&state_dir)
        .with_context(|| format!("creating log dir {}", state_dir.display()))?;
    Ok(state_dir.join(LOG_FILE))
}

/// Log to the state-dir file and return its path. Errors leave no subscriber
/// installed, so the caller can fall back to [`init_logging_stderr`].
pub fn init_logging() -> Result<PathBuf> {
    let path = log_file_path()?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    install(BoxMakeWriter::new(Mutex::new(file)))?;
    tracing::info!(log_file = %path.display(), "reconnd logging initialized");
    Ok(path)
}

/// Log to stderr. A subscriber that is already installed is left in place.
pub fn init_logging_stderr() {
    let _ = install(BoxMakeWriter::new(io::stderr));
}
