use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_FILE_KEY: &str = "LOG_FILE";

/// Console logging on stderr, plus an append-only file when `LOG_FILE` is set.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,atlas_models=debug"));

    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file = match std::env::var(LOG_FILE_KEY) {
        Ok(path) if !path.trim().is_empty() => {
            let file = open_log_file(&path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

/// Open `path` for appending. The file is never truncated or rotated here;
/// rotation belongs to the host (logrotate or similar).
fn open_log_file(path: &str) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path))
}
