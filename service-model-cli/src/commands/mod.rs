use anyhow::{Context, Result};
use std::path::Path;

use service_model::config::Config;

pub mod explain;
pub mod models;

/// Load the config from `path`, or from the standard search path
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load_for_service("smodel").context("Failed to load config"),
    }
}
