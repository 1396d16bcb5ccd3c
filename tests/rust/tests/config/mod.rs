//! Configuration parsing and validation boundaries.

use mdbmcp_core::config::{env as config_env, validation, TransportKind, UserConfig};
use mdbmcp_core::logging::SinkName;
use pretty_assertions::assert_eq;

fn env_pairs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn http_port_boundaries_reject_at_config_time() {
    for port in [0u32, 65_536] {
        let config = UserConfig {
            transport: TransportKind::Http,
            http_port: port,
            ..UserConfig::default()
        };
        assert!(
            validation::validate(&config).is_err(),
            "port {port} must be rejected"
        );
    }
    for port in [1u32, 3000, 65_535] {
        let config = UserConfig {
            transport: TransportKind::Http,
            http_port: port,
            ..UserConfig::default()
        };
        assert!(
            validation::validate(&config).is_ok(),
            "port {port} must be accepted"
        );
    }
}

#[test]
fn empty_loggers_reject() {
    let config = UserConfig {
        loggers: vec![],
        ..UserConfig::default()
    };
    assert!(validation::validate(&config).is_err());
}

#[test]
fn duplicate_loggers_reject() {
    let config = UserConfig {
        loggers: vec![SinkName::Mcp, SinkName::Mcp],
        ..UserConfig::default()
    };
    assert!(validation::validate(&config).is_err());
}

#[test]
fn three_host_connection_string_is_preserved_verbatim() {
    let uri = "mongodb://alpha:27017,beta:27017,gamma:27017/?replicaSet=rs0";
    let mut config = UserConfig::default();
    config_env::apply_env_vars(
        &mut config,
        env_pairs(&[("MDB_MCP_CONNECTION_STRING", uri)]).into_iter(),
    );
    assert_eq!(config.connection_string.as_deref(), Some(uri));
    assert!(validation::validate(&config).is_ok());
}

#[test]
fn env_coercion_number_bool_array_string() {
    let mut config = UserConfig::default();
    config_env::apply_env_vars(
        &mut config,
        env_pairs(&[
            ("MDB_MCP_HTTP_PORT", "4242"),
            ("MDB_MCP_INDEX_CHECK", "true"),
            ("MDB_MCP_DISABLED_TOOLS", "find,count"),
            ("MDB_MCP_HTTP_HOST", "0.0.0.0"),
            ("MDB_MCP_TRANSPORT", "http"),
        ])
        .into_iter(),
    );
    assert_eq!(config.http_port, 4242);
    assert!(config.index_check);
    assert_eq!(config.disabled_tools, vec!["find", "count"]);
    assert_eq!(config.http_host, "0.0.0.0");
    assert_eq!(config.transport, TransportKind::Http);
}

#[test]
fn secrets_from_config_are_redactable() {
    let mut config = UserConfig::default();
    config_env::apply_env_vars(
        &mut config,
        env_pairs(&[
            ("MDB_MCP_PASSWORD", "p4ssw0rd"),
            ("MDB_MCP_API_CLIENT_SECRET", "atlas-secret"),
        ])
        .into_iter(),
    );

    let keychain = mdbmcp_core::Keychain::new();
    config.register_secrets(&keychain);
    let redacted = keychain.redact("auth with p4ssw0rd and atlas-secret");
    assert!(!redacted.contains("p4ssw0rd"));
    assert!(!redacted.contains("atlas-secret"));
}
