//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::model::{TimeRange, VariableValue};
use crate::query::{DisplayZone, TemplateRegistry};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub expansion: ExpansionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Dashboard variables registered at startup
    #[serde(default)]
    pub variables: BTreeMap<String, VariableValue>,
}

/// Macro expansion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExpansionConfig {
    /// Zone for custom date patterns: "local", "utc" or an offset like "+02:00"
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_variable_query_range")]
    pub variable_query_range_hours: i64,
}

fn default_timezone() -> String {
    "local".to_string()
}

fn default_variable_query_range() -> i64 {
    crate::model::DEFAULT_RANGE_HOURS
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            variable_query_range_hours: default_variable_query_range(),
        }
    }
}

impl ExpansionConfig {
    /// Parse the configured zone
    pub fn display_zone(&self) -> Result<DisplayZone, ConfigError> {
        DisplayZone::parse(&self.timezone)
            .ok_or_else(|| ConfigError::InvalidTimezone(self.timezone.clone()))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::default().with_overrides(env_var)
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::read(path)?.with_overrides(env_var)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("docdb-query").join("config.toml")),
            Some(PathBuf::from("/etc/docdb-query/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Registry pre-populated with the configured dashboard variables
    pub fn registry(&self) -> TemplateRegistry {
        self.variables
            .iter()
            .fold(TemplateRegistry::new(), |registry, (name, value)| {
                registry.with_variable(name.clone(), value.clone())
            })
    }

    /// Check values that parse as TOML but are unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.expansion.display_zone()?;

        let hours = self.expansion.variable_query_range_hours;
        if TimeRange::last_hours(hours).is_none() {
            return Err(ConfigError::InvalidRangeHours(hours));
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Apply variable overrides, then validate the result
    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(timezone) = lookup("DOCDB_QUERY_TIMEZONE") {
            self.expansion.timezone = timezone;
        }

        if let Some(level) = lookup("DOCDB_QUERY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("DOCDB_QUERY_LOG_FORMAT") {
            self.logging.format = format;
        }

        self.validate()?;
        Ok(self)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid timezone '{0}': use \"local\", \"utc\" or an offset like \"+02:00\"")]
    InvalidTimezone(String),

    #[error("Invalid variable_query_range_hours {0}: must be a non-negative, representable span")]
    InvalidRangeHours(i64),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# docdb-query Configuration
#
# Environment variables override these settings:
# - DOCDB_QUERY_TIMEZONE
# - DOCDB_QUERY_LOG_LEVEL
# - DOCDB_QUERY_LOG_FORMAT

[expansion]
# Zone for custom date patterns in time macros
# ("local", "utc" or a fixed offset such as "+02:00")
timezone = "local"

# Range used by variable queries when the caller gives none (hours)
variable_query_range_hours = 6

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/docdb-query/docdb-query.log"

[variables]
# Dashboard variables available to every query
# env = "prod"
# hosts = ["web-1", "web-2"]
"#
    .to_string()
}
