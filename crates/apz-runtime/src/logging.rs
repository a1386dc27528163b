#![forbid(unsafe_code)]

//! Global `tracing` subscriber setup.
//!
//! Library code only emits events; installing a subscriber is the host's
//! call. [`init`] is a convenience for hosts that have no subscriber of
//! their own. `RUST_LOG`, when set and valid, overrides the configured
//! filter.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::LoggingError;

/// Resolve the filter: `RUST_LOG` first, then `config.filter`.
pub fn filter_for(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| LoggingError::InvalidFilter(e.to_string()))
}

/// Install a global fmt subscriber, JSON lines when `config.json` is set.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = filter_for(config)?;
    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    installed.map_err(|_| LoggingError::AlreadyInitialized)?;
    tracing::debug!(message = "apz.logging.init", json = config.json);
    Ok(())
}
