//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: SERVICE_MODEL_, nested keys split on `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/service-model/{service_name}/config.toml
//! 4. System directory: /etc/service-model/{service_name}/config.toml
//! 5. Default values
//!
//! ```toml
//! [service]
//! name = "blog"
//! log_level = "debug"
//!
//! [query]
//! default_group = "list"
//! max_per_page = 50
//!
//! [models.posts]
//! table = "posts"
//! fillable = ["title", "body"]
//!
//! [rules.posts.default]
//! title = "required|string|max:255"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::repository::{ModelDefinition, RuleSet};

const ENV_PREFIX: &str = "SERVICE_MODEL_";
const XDG_PREFIX: &str = "service-model";
const SYSTEM_DIR: &str = "/etc/service-model";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,

    /// Query defaults
    #[serde(default)]
    pub query: QueryConfig,

    /// Record metadata keyed by model name
    #[serde(default)]
    pub models: BTreeMap<String, ModelDefinition>,

    /// Validation rule sets: model name -> rule name -> field -> constraints
    #[serde(default)]
    pub rules: BTreeMap<String, BTreeMap<String, RuleSet>>,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Defaults applied by queries when the caller passes none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Column group used by paginate when no group is given
    #[serde(default = "default_group")]
    pub default_group: String,

    /// Rule set used by writes that ask for the default rule
    #[serde(default = "default_rule")]
    pub default_rule: String,

    #[serde(default = "default_per_page")]
    pub default_per_page: u64,

    /// Upper bound for page sizes requested by callers
    #[serde(default = "default_max_per_page")]
    pub max_per_page: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_group: default_group(),
            default_rule: default_rule(),
            default_per_page: default_per_page(),
            max_per_page: default_max_per_page(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_group() -> String {
    "list".to_string()
}

fn default_rule() -> String {
    "default".to_string()
}

fn default_per_page() -> u64 {
    20
}

fn default_max_per_page() -> u64 {
    100
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found is used):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/service-model/{service_name}/config.toml
    /// 3. System directory: /etc/service-model/{service_name}/config.toml
    ///
    /// Environment variables (SERVICE_MODEL_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        // Try to infer service name from binary name or use default
        let service_name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| XDG_PREFIX.to_string());

        Self::load_for_service(&service_name)
    }

    /// Load configuration for a specific service name
    pub fn load_for_service(service_name: &str) -> Result<Self> {
        let config_paths = Self::find_config_paths(service_name);

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so later merges win
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    /// Environment variables still override the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        Ok(config)
    }

    /// Parse configuration from TOML text over the defaults, ignoring the environment
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths for a service
    ///
    /// Returns paths in priority order (highest first):
    /// 1. Current working directory
    /// 2. XDG config directory
    /// 3. System directory
    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix(XDG_PREFIX);
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from(SYSTEM_DIR).join(service_name).join("config.toml"));

        paths
    }

    /// Record metadata of a configured model
    pub fn model(&self, name: &str) -> Option<&ModelDefinition> {
        self.models.get(name)
    }

    /// Rule sets of a configured model
    pub fn rules_for(&self, model: &str) -> Option<&BTreeMap<String, RuleSet>> {
        self.rules.get(model).filter(|rules| !rules.is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: XDG_PREFIX.to_string(),
                log_level: default_log_level(),
            },
            query: QueryConfig::default(),
            models: BTreeMap::new(),
            rules: BTreeMap::new(),
        }
    }
}
