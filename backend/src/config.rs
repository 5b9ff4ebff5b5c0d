//! Configuration for the DocuChat BFF.

use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for the BFF.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Outbound call protection: overall deadline and circuit breaker tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Hard deadline for one outbound call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Consecutive failures before a target's breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown before an open breaker admits a probe call, in seconds.
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            failure_threshold: default_failure_threshold(),
            recovery_secs: default_recovery_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn recovery(&self) -> Duration {
        Duration::from_secs(self.recovery_secs)
    }
}

/// Base URLs of sibling services, keyed by service name.
///
/// Example: `{ "model_service" = "http://model:8001" }`
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServicesConfig {
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

impl ServicesConfig {
    pub fn url(&self, name: &str) -> Option<&str> {
        self.urls.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Directory holding uploaded media files.
    #[serde(default = "default_media_dir")]
    pub dir: String,
    /// Window served for an open-ended range request, in bytes.
    #[serde(default = "default_range_window")]
    pub range_window: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
            range_window: default_range_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    180
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_secs() -> u64 {
    30
}
fn default_media_dir() -> String {
    "media".to_string()
}
fn default_range_window() -> u64 {
    1024 * 1024
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (DOCUCHAT__SECTION__KEY format)
    /// 2. config.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("DOCUCHAT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
