//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Restriction engine configuration.
    #[serde(default)]
    pub restrictions: RestrictionConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON formatted log lines.
    #[serde(default)]
    pub json: bool,
}

/// Restriction engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RestrictionConfig {
    /// Timezone applied to new quota and time restrictions that omit one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
    /// How often a reservation is retried after a version conflict.
    #[serde(default = "default_max_reservation_retries")]
    pub max_reservation_retries: u32,
    /// Smallest lease a reservation may grant.
    #[serde(default = "default_minimum_lease")]
    pub minimum_lease: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

const fn default_max_reservation_retries() -> u32 {
    3
}

const fn default_minimum_lease() -> u32 {
    1
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for RestrictionConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            max_reservation_retries: default_max_reservation_retries(),
            minimum_lease: default_minimum_lease(),
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `QUOTAGATE_ENV`)
    /// 4. Environment variables with `QUOTAGATE__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("QUOTAGATE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUOTAGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("QUOTAGATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
