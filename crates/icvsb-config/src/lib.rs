// icvsb-config - Unified runtime configuration
//
// Supports configuration from multiple sources, highest priority first:
// 1. Environment variables (ICVSB_*)
// 2. Config file path from ICVSB_CONFIG env var
// 3. Config file contents from ICVSB_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.icvsb.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod sources;
mod validation;

/// Top-level runtime configuration (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub vendors: VendorConfig,
}

/// `ICVSB_DATABASE_CONNECTION_URL` / `ICVSB_DATABASE_LOG_FILE` (spec §6.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_url: "sqlite://icvsb.db".to_string(),
            log_file: Some("icvsb.db.log".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(default = "default_response_cache_capacity")]
    pub response_cache_capacity: usize,
}

fn default_response_cache_capacity() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            response_cache_capacity: default_response_cache_capacity(),
        }
    }
}

/// `ICVSB_LOGGER_FILE` and ambient log verbosity/format (spec §6.3, §10.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Vendor credentials (spec §6.3: `AZURE_SUBSCRIPTION_KEY` has no `ICVSB_`
/// prefix since it names a vendor's own secret, not this crate's config).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VendorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amazon_secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_subscription_key: Option<String>,
}

impl RuntimeConfig {
    /// Loads configuration from all sources with priority (spec §6.3).
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let db = DatabaseConfig::default();
        assert_eq!(db.connection_url, "sqlite://icvsb.db");

        let server = ServerConfig::default();
        assert_eq!(server.listen_addr, "0.0.0.0:8080");

        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, LogFormat::Text);
    }
}
