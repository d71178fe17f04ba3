use config::{Config, File};
use serde::Deserialize;

pub use config::ConfigError;

use crate::errors::{BotError, BotResult};
use crate::grid::EngineConfig;
use crate::venue::SimVenueConfig;

/// Whether orders touch a real exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Trade against the in-process simulated venue
    Paper,
    /// Trade against a live venue adapter
    Live,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Paper
    }
}

/// Main configuration struct
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub mode: RunMode,
    /// Engine tuning (pair, leverage, grid parameters)
    pub engine: EngineConfig,
    /// Logging configuration
    pub log: LogConfig,
    /// Simulated venue parameters, used in paper mode
    pub paper: SimVenueConfig,
    /// Path to a JSON credentials file, required in live mode
    pub credentials_file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            engine: EngineConfig::default(),
            log: LogConfig::default(),
            paper: SimVenueConfig::default(),
            credentials_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings from an optional configuration file, overridden by
    /// environment variables, e.g. `APP_ENGINE__LEVERAGE=5`.
    pub fn new(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path));
        }
        builder
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()
    }
}

/// Exchange API credentials, kept out of the main config file.
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    #[serde(rename = "API_KEY")]
    pub api_key: String,
    #[serde(rename = "API_SECRET")]
    pub api_secret: String,
}

impl Credentials {
    /// Load credentials from a JSON file shaped like
    /// `{"API_KEY": "...", "API_SECRET": "..."}`.
    pub fn load(path: &str) -> BotResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BotError::Credentials(format!("reading {path}: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| BotError::Credentials(format!("parsing {path}: {e}")))
    }
}
