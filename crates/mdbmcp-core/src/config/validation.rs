//! Startup validation of the merged configuration.
//!
//! The only fatal configuration problems are the ones here; everything
//! else surfaces later as tool errors.

use std::collections::BTreeSet;

use thiserror::Error;

use super::{TransportKind, UserConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("httpPort must be between 1 and 65535, got {0}")]
    InvalidHttpPort(u32),
    #[error("loggers must not be empty")]
    EmptyLoggers,
    #[error("loggers must not contain duplicates")]
    DuplicateLoggers,
    #[error("connectionString must start with mongodb:// or mongodb+srv://, got `{0}`")]
    InvalidConnectionStringScheme(String),
    #[error("idleTimeoutMs must be greater than notificationTimeoutMs")]
    TimeoutOrdering,
    #[error("apiClientId and apiClientSecret must be provided together")]
    PartialAtlasCredentials,
}

/// Validate the merged config. Called once at startup; an `Err` here makes
/// the process exit 1.
pub fn validate(config: &UserConfig) -> Result<(), ConfigError> {
    if !(1..=65535).contains(&config.http_port) {
        return Err(ConfigError::InvalidHttpPort(config.http_port));
    }

    if config.loggers.is_empty() {
        return Err(ConfigError::EmptyLoggers);
    }
    let unique: BTreeSet<&str> = config.loggers.iter().map(|l| l.as_str()).collect();
    if unique.len() != config.loggers.len() {
        return Err(ConfigError::DuplicateLoggers);
    }

    if let Some(connection_string) = &config.connection_string {
        if !connection_string.starts_with("mongodb://")
            && !connection_string.starts_with("mongodb+srv://")
        {
            return Err(ConfigError::InvalidConnectionStringScheme(
                connection_string.clone(),
            ));
        }
    }

    if config.transport == TransportKind::Http
        && config.notification_timeout_ms >= config.idle_timeout_ms
    {
        return Err(ConfigError::TimeoutOrdering);
    }

    if config.api_client_id.is_some() != config.api_client_secret.is_some() {
        return Err(ConfigError::PartialAtlasCredentials);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::SinkName;

    fn http_config() -> UserConfig {
        UserConfig {
            transport: TransportKind::Http,
            ..UserConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate(&UserConfig::default()), Ok(()));
    }

    #[test]
    fn http_port_zero_rejects() {
        let config = UserConfig {
            http_port: 0,
            ..http_config()
        };
        assert_eq!(validate(&config), Err(ConfigError::InvalidHttpPort(0)));
    }

    #[test]
    fn http_port_above_range_rejects() {
        let config = UserConfig {
            http_port: 65536,
            ..http_config()
        };
        assert_eq!(validate(&config), Err(ConfigError::InvalidHttpPort(65536)));
    }

    #[test]
    fn http_port_is_validated_even_for_stdio() {
        let config = UserConfig {
            http_port: 0,
            ..UserConfig::default()
        };
        assert_eq!(validate(&config), Err(ConfigError::InvalidHttpPort(0)));
    }

    #[test]
    fn empty_loggers_reject() {
        let config = UserConfig {
            loggers: vec![],
            ..UserConfig::default()
        };
        assert_eq!(validate(&config), Err(ConfigError::EmptyLoggers));
    }

    #[test]
    fn duplicate_loggers_reject() {
        let config = UserConfig {
            loggers: vec![SinkName::Stderr, SinkName::Stderr],
            ..UserConfig::default()
        };
        assert_eq!(validate(&config), Err(ConfigError::DuplicateLoggers));
    }

    #[test]
    fn multi_host_connection_string_is_preserved_and_valid() {
        let uri = "mongodb://h1:27017,h2:27017,h3:27017/?replicaSet=rs0";
        let config = UserConfig {
            connection_string: Some(uri.to_string()),
            ..UserConfig::default()
        };
        assert_eq!(validate(&config), Ok(()));
        assert_eq!(config.connection_string.as_deref(), Some(uri));
    }

    #[test]
    fn non_mongodb_scheme_rejects() {
        let config = UserConfig {
            connection_string: Some("postgres://localhost".to_string()),
            ..UserConfig::default()
        };
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidConnectionStringScheme(_))
        ));
    }

    #[test]
    fn partial_atlas_credentials_reject() {
        let config = UserConfig {
            api_client_id: Some("id".to_string()),
            ..UserConfig::default()
        };
        assert_eq!(validate(&config), Err(ConfigError::PartialAtlasCredentials));
    }
}
