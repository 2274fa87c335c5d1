//! Tracing setup
//!
//! Library code only emits `tracing` events; binaries call [`init_tracing`] once
//! to install a JSON subscriber filtered by `service.log_level`.

#[cfg(feature = "observability")]
use tracing_subscriber::EnvFilter;

use crate::{config::Config, error::Result};

/// Install a JSON formatting subscriber
///
/// An unparsable `log_level` falls back to `info`. Fails when a global
/// subscriber is already installed.
#[cfg(feature = "observability")]
pub fn init_tracing(config: &Config) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| crate::error::Error::Internal(format!("Failed to install subscriber: {}", e)))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}

/// No subscriber is installed without the `observability` feature
#[cfg(not(feature = "observability"))]
pub fn init_tracing(config: &Config) -> Result<()> {
    let _ = config;
    Ok(())
}

/// Flush and shut down tracing
pub fn shutdown_tracing() {
    tracing::info!("Tracing shutdown complete");
}
