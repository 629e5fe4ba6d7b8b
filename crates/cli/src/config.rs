//! Client configuration.
//!
//! Loaded from a YAML file; every field has a default, so a missing file is
//! not an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default well-known identity of the account service.
pub const DEFAULT_BUS_NAME: &str = "org.palaver.AccountService1";
/// Default tracing filter.
pub const DEFAULT_LOG_FILTER: &str = "palaver=info,warn";

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_palaver_dir() -> PathBuf {
    home_dir().join(".palaver")
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Account service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Account service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Well-known identity to watch for on the bus.
    #[serde(default = "ServiceConfig::default_bus_name")]
    pub bus_name: String,
}

impl ServiceConfig {
    fn default_bus_name() -> String {
        DEFAULT_BUS_NAME.to_string()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bus_name: DEFAULT_BUS_NAME.to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Tracing filter used when RUST_LOG is not set.
    #[serde(default = "LoggingConfig::default_filter")]
    pub filter: String,
}

impl LoggingConfig {
    fn default_filter() -> String {
        DEFAULT_LOG_FILTER.to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Default config location, `~/.palaver/config.yml`.
    pub fn default_path() -> PathBuf {
        default_palaver_dir().join("config.yml")
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Write the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let text = serde_yml::to_string(self).context("serializing config")?;
        std::fs::write(path, text).with_context(|| format!("writing config {}", path.display()))
    }

    /// Sample configuration with every default spelled out.
    pub fn sample() -> Self {
        Self::default()
    }
}
