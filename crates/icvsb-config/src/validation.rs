// Configuration validation
//
// Validates that required fields are present and values are sensible.

use crate::*;
use anyhow::{bail, Result};

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_database_config(&config.database)?;
    validate_server_config(&config.server)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_database_config(config: &DatabaseConfig) -> Result<()> {
    if config.connection_url.is_empty() {
        bail!("database.connection_url must not be empty");
    }
    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }
    if !config.listen_addr.contains(':') {
        bail!("server.listen_addr must be in format 'host:port'");
    }
    if config.response_cache_capacity == 0 {
        bail!("server.response_cache_capacity must be greater than 0");
    }
    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
    if !LEVELS.contains(&config.level.to_lowercase().as_str()) {
        bail!(
            "logging.level must be one of {:?}, got '{}'",
            LEVELS,
            config.level
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_server_config() {
        let valid = ServerConfig {
            listen_addr: "0.0.0.0:8080".to_string(),
            response_cache_capacity: 1024,
        };
        assert!(validate_server_config(&valid).is_ok());

        let invalid = ServerConfig {
            listen_addr: String::new(),
            response_cache_capacity: 1024,
        };
        assert!(validate_server_config(&invalid).is_err());
    }

    #[test]
    fn test_validate_logging_config_rejects_unknown_level() {
        let invalid = LoggingConfig {
            level: "verbose".to_string(),
            format: LogFormat::Text,
            file: None,
        };
        assert!(validate_logging_config(&invalid).is_err());
    }
}
