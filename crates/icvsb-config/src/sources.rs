// Configuration source loading
//
// Loads configuration from multiple sources with priority:
// 1. Environment variables (highest)
// 2. Config file from ICVSB_CONFIG path
// 3. Inline config from ICVSB_CONFIG_CONTENT
// 4. Default config files (./config.toml, ./.icvsb.toml)
// 5. Built-in defaults (lowest)

use crate::*;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const ENV_PREFIX: &str = "ICVSB_";

/// Loads configuration from all sources.
pub fn load_config() -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig {
        database: DatabaseConfig::default(),
        server: ServerConfig::default(),
        logging: LoggingConfig::default(),
        vendors: VendorConfig::default(),
    };

    if let Some(file_config) = load_from_file()? {
        merge_config(&mut config, file_config);
    }

    apply_env_overrides(&mut config)?;

    config.validate()?;

    Ok(config)
}

/// Loads configuration from file.
fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("ICVSB_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    if let Ok(content) = env::var("ICVSB_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from ICVSB_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in &["./config.toml", "./.icvsb.toml"] {
        if Path::new(path).exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path))?;
            let config: RuntimeConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path))?;
            return Ok(Some(config));
        }
    }

    Ok(None)
}

/// Merges file-based config into the base config.
fn merge_config(base: &mut RuntimeConfig, file: RuntimeConfig) {
    base.database = file.database;
    base.server = file.server;
    base.logging = file.logging;
    base.vendors = file.vendors;
}

/// Applies environment variable overrides (highest priority).
fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<()> {
    if let Some(val) = get_env_string("DATABASE_CONNECTION_URL")? {
        config.database.connection_url = val;
    }
    if let Some(val) = get_env_string("DATABASE_LOG_FILE")? {
        config.database.log_file = Some(val);
    }

    if let Some(val) = get_env_string("LISTEN_ADDR")? {
        config.server.listen_addr = val;
    }
    if let Some(val) = get_env_usize("RESPONSE_CACHE_CAPACITY")? {
        config.server.response_cache_capacity = val;
    }

    if let Some(val) = get_env_string("LOG_LEVEL")? {
        config.logging.level = val;
    }
    if let Some(val) = get_env_string("LOG_FORMAT")? {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }
    if let Some(val) = get_env_string("LOGGER_FILE")? {
        config.logging.file = Some(val);
    }

    // Vendor credentials are read without the ICVSB_ prefix: they name the
    // vendor's own secret, not an icvsb setting (spec §6.3).
    if let Ok(val) = env::var("AZURE_SUBSCRIPTION_KEY") {
        if !val.is_empty() {
            config.vendors.azure_subscription_key = Some(val);
        }
    }
    if let Ok(val) = env::var("GOOGLE_VISION_API_KEY") {
        if !val.is_empty() {
            config.vendors.google_api_key = Some(val);
        }
    }
    if let Ok(val) = env::var("AWS_ACCESS_KEY_ID") {
        if !val.is_empty() {
            config.vendors.amazon_access_key = Some(val);
        }
    }
    if let Ok(val) = env::var("AWS_SECRET_ACCESS_KEY") {
        if !val.is_empty() {
            config.vendors.amazon_secret_key = Some(val);
        }
    }

    Ok(())
}

fn get_env_string(key: &str) -> Result<Option<String>> {
    let full_key = format!("{}{}", ENV_PREFIX, key);
    match env::var(&full_key) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to read env var {}", full_key)),
    }
}

fn get_env_usize(key: &str) -> Result<Option<usize>> {
    let full_key = format!("{}{}", ENV_PREFIX, key);
    match get_env_string(key)? {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .with_context(|| format!("{} must be a valid number", full_key))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn env_override_takes_priority_over_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("ICVSB_DATABASE_CONNECTION_URL", "sqlite://test.db");
        let mut config = RuntimeConfig {
            database: DatabaseConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            vendors: VendorConfig::default(),
        };
        apply_env_overrides(&mut config).unwrap();
        assert_eq!(config.database.connection_url, "sqlite://test.db");
        std::env::remove_var("ICVSB_DATABASE_CONNECTION_URL");
    }
}
