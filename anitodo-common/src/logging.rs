//! Tracing initialisation
//!
//! `RUST_LOG` takes precedence over the configured level, so a single run can
//! be made more verbose without editing the config file.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber
///
/// Logs go to the configured file when one is set (appending), otherwise to stderr.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config);

    match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .try_init()
                .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e)))
        }
        None => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {}", e))),
    }
}
