//! `MDB_MCP_*` environment variable parsing.
//!
//! Every config field maps to `MDB_MCP_<SNAKE_CASE>`. Values are coerced
//! number → boolean → array (comma-split) → string, except URL-valued
//! fields, which are kept verbatim so query strings and commas survive.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::warn;

use super::{TelemetryMode, TransportKind, UserConfig};
use crate::logging::SinkName;

const PREFIX: &str = "MDB_MCP_";

/// A value after generic coercion.
#[derive(Debug, Clone, PartialEq)]
enum EnvValue {
    Number(i64),
    Bool(bool),
    Array(Vec<String>),
    Text(String),
}

fn coerce(raw: &str) -> EnvValue {
    if let Ok(n) = raw.parse::<i64>() {
        return EnvValue::Number(n);
    }
    match raw {
        "true" => return EnvValue::Bool(true),
        "false" => return EnvValue::Bool(false),
        _ => {}
    }
    if raw.contains(',') {
        return EnvValue::Array(raw.split(',').map(|s| s.trim().to_string()).collect());
    }
    EnvValue::Text(raw.to_string())
}

impl EnvValue {
    fn into_string(self) -> String {
        match self {
            EnvValue::Number(n) => n.to_string(),
            EnvValue::Bool(b) => b.to_string(),
            EnvValue::Array(items) => items.join(","),
            EnvValue::Text(s) => s,
        }
    }

    fn into_array(self) -> Vec<String> {
        match self {
            EnvValue::Array(items) => items,
            other => vec![other.into_string()],
        }
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            EnvValue::Number(n) if *n >= 0 => Some(*n as u64),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            EnvValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Apply all `MDB_MCP_*` variables from `vars` onto `config`.
///
/// Unknown keys and un-coercible values are warned about and skipped, they
/// are not fatal: validation of the merged config decides what is.
pub fn apply_env_vars(config: &mut UserConfig, vars: impl Iterator<Item = (String, String)>) {
    for (key, raw) in vars {
        let Some(field) = key.strip_prefix(PREFIX) else {
            continue;
        };
        let field = field.to_ascii_lowercase();
        apply_one(config, &field, &raw);
    }
}

/// Apply the process environment onto `config`.
pub fn apply_process_env(config: &mut UserConfig) {
    apply_env_vars(config, std::env::vars());
}

fn apply_one(config: &mut UserConfig, field: &str, raw: &str) {
    // URL-valued fields bypass coercion entirely.
    match field {
        "connection_string" => {
            config.connection_string = Some(raw.to_string());
            return;
        }
        "api_base_url" => {
            config.api_base_url = raw.to_string();
            return;
        }
        _ => {}
    }

    let value = coerce(raw);
    match field {
        "api_client_id" => config.api_client_id = Some(value.into_string()),
        "api_client_secret" => config.api_client_secret = Some(value.into_string()),
        "username" => config.username = Some(value.into_string()),
        "password" => config.password = Some(value.into_string()),
        "tls_ca_file" => config.tls_ca_file = Some(value.into_string()),
        "tls_certificate_key_file" => {
            config.tls_certificate_key_file = Some(value.into_string())
        }
        "tls_certificate_key_file_password" => {
            config.tls_certificate_key_file_password = Some(value.into_string())
        }
        "browser" => config.browser = Some(value.into_string()),
        "transport" => match TransportKind::parse(&value.into_string()) {
            Some(t) => config.transport = t,
            None => warn!("[Config] Ignoring invalid MDB_MCP_TRANSPORT"),
        },
        "telemetry" => match TelemetryMode::parse(&value.into_string()) {
            Some(t) => config.telemetry = t,
            None => warn!("[Config] Ignoring invalid MDB_MCP_TELEMETRY"),
        },
        "http_host" => config.http_host = value.into_string(),
        "http_port" => match value.as_u64() {
            Some(port) => config.http_port = port as u32,
            None => warn!("[Config] Ignoring non-numeric MDB_MCP_HTTP_PORT"),
        },
        "http_headers" => {
            config.http_headers = parse_headers(value.into_array());
        }
        "idle_timeout_ms" => set_u64(&mut config.idle_timeout_ms, &value, "IDLE_TIMEOUT_MS"),
        "notification_timeout_ms" => set_u64(
            &mut config.notification_timeout_ms,
            &value,
            "NOTIFICATION_TIMEOUT_MS",
        ),
        "export_timeout_ms" => set_u64(&mut config.export_timeout_ms, &value, "EXPORT_TIMEOUT_MS"),
        "export_cleanup_interval_ms" => set_u64(
            &mut config.export_cleanup_interval_ms,
            &value,
            "EXPORT_CLEANUP_INTERVAL_MS",
        ),
        "read_only" => set_bool(&mut config.read_only, &value, "READ_ONLY"),
        "index_check" => set_bool(&mut config.index_check, &value, "INDEX_CHECK"),
        "disabled_tools" => config.disabled_tools = value.into_array(),
        "confirmation_required_tools" => {
            config.confirmation_required_tools = value.into_array()
        }
        "loggers" => {
            let (parsed, unknown): (Vec<_>, Vec<_>) = value
                .into_array()
                .into_iter()
                .map(|name| (SinkName::parse(&name), name))
                .partition(|(parsed, _)| parsed.is_some());
            for (_, name) in &unknown {
                warn!("[Config] Unknown logger `{name}` in MDB_MCP_LOGGERS");
            }
            // Invalid names still surface through validation: an entirely
            // unknown list collapses to empty, which validation rejects.
            config.loggers = parsed.into_iter().filter_map(|(p, _)| p).collect();
        }
        "log_path" => config.log_path = PathBuf::from(raw),
        "exports_path" => config.exports_path = PathBuf::from(raw),
        other => warn!("[Config] Unknown environment variable MDB_MCP_{}", other.to_ascii_uppercase()),
    }
}

fn set_u64(slot: &mut u64, value: &EnvValue, name: &str) {
    match value.as_u64() {
        Some(v) => *slot = v,
        None => warn!("[Config] Ignoring non-numeric MDB_MCP_{name}"),
    }
}

fn set_bool(slot: &mut bool, value: &EnvValue, name: &str) {
    match value.as_bool() {
        Some(v) => *slot = v,
        None => warn!("[Config] Ignoring non-boolean MDB_MCP_{name}"),
    }
}

fn parse_headers(items: Vec<String>) -> BTreeMap<String, String> {
    items
        .into_iter()
        .filter_map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Iterator<Item = (String, String)> + 'a {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
    }

    #[test]
    fn connection_string_is_kept_verbatim() {
        let mut config = UserConfig::default();
        let uri = "mongodb://h1:27017,h2:27017,h3:27017/?replicaSet=rs0";
        apply_env_vars(&mut config, env(&[("MDB_MCP_CONNECTION_STRING", uri)]));
        // A comma-containing URI must not be array-split.
        assert_eq!(config.connection_string.as_deref(), Some(uri));
    }

    #[test]
    fn numbers_and_booleans_are_coerced() {
        let mut config = UserConfig::default();
        apply_env_vars(
            &mut config,
            env(&[
                ("MDB_MCP_HTTP_PORT", "8080"),
                ("MDB_MCP_READ_ONLY", "true"),
                ("MDB_MCP_IDLE_TIMEOUT_MS", "120000"),
            ]),
        );
        assert_eq!(config.http_port, 8080);
        assert!(config.read_only);
        assert_eq!(config.idle_timeout_ms, 120_000);
    }

    #[test]
    fn arrays_are_comma_split() {
        let mut config = UserConfig::default();
        apply_env_vars(
            &mut config,
            env(&[
                ("MDB_MCP_DISABLED_TOOLS", "drop-database, delete-many"),
                ("MDB_MCP_LOGGERS", "stderr,mcp"),
            ]),
        );
        assert_eq!(config.disabled_tools, vec!["drop-database", "delete-many"]);
        assert_eq!(config.loggers, vec![SinkName::Stderr, SinkName::Mcp]);
    }

    #[test]
    fn single_element_array_fields_accept_plain_strings() {
        let mut config = UserConfig::default();
        apply_env_vars(&mut config, env(&[("MDB_MCP_DISABLED_TOOLS", "export")]));
        assert_eq!(config.disabled_tools, vec!["export"]);
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let mut config = UserConfig::default();
        apply_env_vars(&mut config, env(&[("PATH", "/usr/bin"), ("MDB_UNRELATED", "1")]));
        assert_eq!(config.connection_string, None);
    }

    #[test]
    fn http_headers_parse_key_value_pairs() {
        let mut config = UserConfig::default();
        apply_env_vars(
            &mut config,
            env(&[("MDB_MCP_HTTP_HEADERS", "x-api-key=abc123,x-tenant=t1")]),
        );
        assert_eq!(config.http_headers.get("x-api-key").unwrap(), "abc123");
        assert_eq!(config.http_headers.get("x-tenant").unwrap(), "t1");
    }
}
