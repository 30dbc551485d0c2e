//! Diagnostic logging setup.
//!
//! Installs a `tracing` subscriber writing to stderr. `RUST_LOG` overrides
//! the configured filter; `json = true` switches to one JSON object per line.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("Invalid log filter {:?}", config.filter))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}
