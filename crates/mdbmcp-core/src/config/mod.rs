//! User configuration, resolved once at startup.
//!
//! Values come from three places, later sources winning: built-in
//! defaults, `MDB_MCP_*` environment variables ([`env`]), and CLI flags
//! (applied by the binary). [`validation`] runs after merging; validation
//! failures are fatal at startup.

pub mod env;
pub mod validation;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::keychain::{Keychain, SecretKind};
use crate::logging::SinkName;

/// Which transport serves the MCP session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Stdio,
    Http,
}

impl TransportKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stdio" => Some(TransportKind::Stdio),
            "http" => Some(TransportKind::Http),
            _ => None,
        }
    }
}

/// Telemetry opt-in state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryMode {
    #[default]
    Enabled,
    Disabled,
}

impl TelemetryMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "enabled" => Some(TelemetryMode::Enabled),
            "disabled" => Some(TelemetryMode::Disabled),
            _ => None,
        }
    }
}

/// Fully merged user configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    // Atlas API
    pub api_base_url: String,
    pub api_client_id: Option<String>,
    pub api_client_secret: Option<String>,

    // MongoDB connection
    pub connection_string: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls_ca_file: Option<String>,
    pub tls_certificate_key_file: Option<String>,
    pub tls_certificate_key_file_password: Option<String>,
    /// Browser command used to complete the OIDC auth flow, when present.
    pub browser: Option<String>,

    // Transport
    pub transport: TransportKind,
    pub http_host: String,
    /// Kept wide so out-of-range values survive until validation.
    pub http_port: u32,
    /// Required header name/value pairs for every HTTP request.
    pub http_headers: BTreeMap<String, String>,
    pub idle_timeout_ms: u64,
    pub notification_timeout_ms: u64,

    // Policy
    pub read_only: bool,
    pub index_check: bool,
    pub disabled_tools: Vec<String>,
    pub confirmation_required_tools: Vec<String>,

    // Logging & telemetry
    pub loggers: Vec<SinkName>,
    pub log_path: PathBuf,
    pub telemetry: TelemetryMode,

    // Exports
    pub exports_path: PathBuf,
    pub export_timeout_ms: u64,
    pub export_cleanup_interval_ms: u64,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://cloud.mongodb.com/".to_string(),
            api_client_id: None,
            api_client_secret: None,
            connection_string: None,
            username: None,
            password: None,
            tls_ca_file: None,
            tls_certificate_key_file: None,
            tls_certificate_key_file_password: None,
            browser: None,
            transport: TransportKind::Stdio,
            http_host: "127.0.0.1".to_string(),
            http_port: 3000,
            http_headers: BTreeMap::new(),
            idle_timeout_ms: 600_000,
            notification_timeout_ms: 540_000,
            read_only: false,
            index_check: false,
            disabled_tools: Vec::new(),
            confirmation_required_tools: vec![
                "drop-database".to_string(),
                "drop-collection".to_string(),
                "delete-many".to_string(),
                "atlas-create-db-user".to_string(),
            ],
            loggers: vec![SinkName::Disk, SinkName::Stderr],
            log_path: default_local_data_path(".app-logs"),
            telemetry: TelemetryMode::Enabled,
            exports_path: default_local_data_path("exports"),
            export_timeout_ms: 300_000,
            export_cleanup_interval_ms: 120_000,
        }
    }
}

impl UserConfig {
    /// Whether the Atlas API client can be constructed.
    pub fn has_atlas_credentials(&self) -> bool {
        self.api_client_id.is_some() && self.api_client_secret.is_some()
    }

    /// Whether telemetry is active, honoring the `DO_NOT_TRACK` convention.
    pub fn telemetry_enabled(&self) -> bool {
        self.telemetry == TelemetryMode::Enabled && std::env::var_os("DO_NOT_TRACK").is_none()
    }

    /// Register every known-sensitive field with the keychain so log sinks
    /// can redact them.
    pub fn register_secrets(&self, keychain: &Keychain) {
        if let Some(username) = &self.username {
            keychain.register(username.clone(), SecretKind::User);
        }
        for password in [
            &self.password,
            &self.api_client_secret,
            &self.tls_certificate_key_file_password,
        ]
        .into_iter()
        .flatten()
        {
            keychain.register(password.clone(), SecretKind::Password);
        }
        for path in [&self.tls_ca_file, &self.tls_certificate_key_file]
            .into_iter()
            .flatten()
        {
            keychain.register(path.clone(), SecretKind::Url);
        }
        if let Some(connection_string) = &self.connection_string {
            keychain.register(connection_string.clone(), SecretKind::Url);
        }
    }
}

/// `<local data>/mongodb-mcp/<leaf>`, falling back to the current
/// directory when the platform has no local-data dir.
fn default_local_data_path(leaf: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mongodb-mcp")
        .join(leaf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stdio_with_disk_and_stderr_loggers() {
        let config = UserConfig::default();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.loggers, vec![SinkName::Disk, SinkName::Stderr]);
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.idle_timeout_ms, 600_000);
        assert_eq!(config.notification_timeout_ms, 540_000);
        assert!(!config.read_only);
    }

    #[test]
    fn atlas_credentials_require_both_halves() {
        let mut config = UserConfig::default();
        assert!(!config.has_atlas_credentials());
        config.api_client_id = Some("id".into());
        assert!(!config.has_atlas_credentials());
        config.api_client_secret = Some("secret".into());
        assert!(config.has_atlas_credentials());
    }

    #[test]
    fn secrets_land_in_the_keychain() {
        let mut config = UserConfig::default();
        config.password = Some("pw".into());
        config.api_client_secret = Some("client-secret".into());
        config.connection_string = Some("mongodb://u:pw@localhost/".into());

        let keychain = Keychain::new();
        config.register_secrets(&keychain);
        assert_eq!(keychain.len(), 3);
        assert!(!keychain.redact("the secret is client-secret").contains("client-secret"));
    }
}
