//! CLI surface.
//!
//! Flags mirror the config fields; a positional `mongodb://` argument
//! wins over `--connection-string` (accepted but deprecated). Unknown
//! flags get clap's built-in did-you-mean suggestion and exit 1.

use std::path::PathBuf;

use clap::Parser;
use tracing::warn;

use mdbmcp_core::config::{TelemetryMode, TransportKind, UserConfig};
use mdbmcp_core::SinkName;

#[derive(Parser, Debug)]
#[command(
    name = "mongodb-mcp-server",
    version,
    about = "MongoDB MCP server: exposes MongoDB and Atlas as MCP tools"
)]
pub struct Cli {
    /// MongoDB connection string (mongodb:// or mongodb+srv://)
    #[arg(value_name = "CONNECTION_STRING")]
    pub positional_connection_string: Option<String>,

    /// Deprecated; pass the connection string as a positional argument
    #[arg(long)]
    pub connection_string: Option<String>,

    /// Transport to serve on: stdio or http
    #[arg(long)]
    pub transport: Option<String>,

    /// Host to bind the HTTP transport to
    #[arg(long)]
    pub http_host: Option<String>,

    /// Port for the HTTP transport (1-65535)
    #[arg(long)]
    pub http_port: Option<u32>,

    /// Required header name=value pairs for every HTTP request
    #[arg(long, value_delimiter = ',')]
    pub http_headers: Vec<String>,

    /// Close idle HTTP sessions after this many milliseconds
    #[arg(long)]
    pub idle_timeout_ms: Option<u64>,

    /// Warn idle HTTP sessions after this many milliseconds
    #[arg(long)]
    pub notification_timeout_ms: Option<u64>,

    /// Directory for rotated application logs
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// Log sinks to enable: stderr, disk, mcp
    #[arg(long, value_delimiter = ',')]
    pub loggers: Vec<String>,

    /// Telemetry: enabled or disabled
    #[arg(long)]
    pub telemetry: Option<String>,

    /// Atlas API base URL
    #[arg(long)]
    pub api_base_url: Option<String>,

    /// Atlas service-account client id
    #[arg(long)]
    pub api_client_id: Option<String>,

    /// Atlas service-account client secret
    #[arg(long)]
    pub api_client_secret: Option<String>,

    /// Username merged into the connection string when it carries none
    #[arg(long)]
    pub username: Option<String>,

    /// Password for --username
    #[arg(long)]
    pub password: Option<String>,

    /// CA file for TLS connections
    #[arg(long)]
    pub tls_ca_file: Option<String>,

    /// Client certificate key file for TLS connections
    #[arg(long)]
    pub tls_certificate_key_file: Option<String>,

    /// Password for the certificate key file
    #[arg(long)]
    pub tls_certificate_key_file_password: Option<String>,

    /// Browser command used to complete OIDC auth flows
    #[arg(long)]
    pub browser: Option<String>,

    /// Register only read and metadata tools
    #[arg(long)]
    pub read_only: bool,

    /// Refuse queries whose winning plan is a collection scan
    #[arg(long)]
    pub index_check: bool,

    /// Tools, categories, or operation types to disable
    #[arg(long, value_delimiter = ',')]
    pub disabled_tools: Vec<String>,

    /// Tools requiring user confirmation before execution
    #[arg(long, value_delimiter = ',')]
    pub confirmation_required_tools: Vec<String>,

    /// Directory for export files
    #[arg(long)]
    pub exports_path: Option<PathBuf>,

    /// Export expiry in milliseconds
    #[arg(long)]
    pub export_timeout_ms: Option<u64>,

    /// Export cleanup sweep interval in milliseconds
    #[arg(long)]
    pub export_cleanup_interval_ms: Option<u64>,
}

/// Errors turned into exit code 1 by main.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid --transport `{0}`: expected stdio or http")]
    InvalidTransport(String),
    #[error("invalid --telemetry `{0}`: expected enabled or disabled")]
    InvalidTelemetry(String),
    #[error("invalid logger `{0}`: expected stderr, disk, or mcp")]
    InvalidLogger(String),
    #[error("positional connection string must start with mongodb:// or mongodb+srv://")]
    InvalidPositional,
}

impl Cli {
    /// Apply the CLI flags onto an env/default-merged config.
    pub fn apply(self, config: &mut UserConfig) -> Result<(), CliError> {
        if let Some(positional) = self.positional_connection_string {
            if !positional.starts_with("mongodb://")
                && !positional.starts_with("mongodb+srv://")
            {
                return Err(CliError::InvalidPositional);
            }
            if self.connection_string.is_some() {
                warn!(
                    "Both a positional connection string and --connection-string were \
                     provided; using the positional one"
                );
            }
            config.connection_string = Some(positional);
        } else if let Some(flag) = self.connection_string {
            warn!("--connection-string is deprecated; pass the connection string as a positional argument");
            config.connection_string = Some(flag);
        }

        if let Some(transport) = self.transport {
            config.transport = TransportKind::parse(&transport)
                .ok_or(CliError::InvalidTransport(transport))?;
        }
        if let Some(telemetry) = self.telemetry {
            config.telemetry = TelemetryMode::parse(&telemetry)
                .ok_or(CliError::InvalidTelemetry(telemetry))?;
        }
        if !self.loggers.is_empty() {
            config.loggers = self
                .loggers
                .into_iter()
                .map(|name| SinkName::parse(&name).ok_or(CliError::InvalidLogger(name)))
                .collect::<Result<_, _>>()?;
        }

        if let Some(host) = self.http_host {
            config.http_host = host;
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if !self.http_headers.is_empty() {
            config.http_headers = self
                .http_headers
                .iter()
                .filter_map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                })
                .collect();
        }
        if let Some(v) = self.idle_timeout_ms {
            config.idle_timeout_ms = v;
        }
        if let Some(v) = self.notification_timeout_ms {
            config.notification_timeout_ms = v;
        }
        if let Some(v) = self.log_path {
            config.log_path = v;
        }
        if let Some(v) = self.api_base_url {
            config.api_base_url = v;
        }
        if let Some(v) = self.api_client_id {
            config.api_client_id = Some(v);
        }
        if let Some(v) = self.api_client_secret {
            config.api_client_secret = Some(v);
        }
        if let Some(v) = self.username {
            config.username = Some(v);
        }
        if let Some(v) = self.password {
            config.password = Some(v);
        }
        if let Some(v) = self.tls_ca_file {
            config.tls_ca_file = Some(v);
        }
        if let Some(v) = self.tls_certificate_key_file {
            config.tls_certificate_key_file = Some(v);
        }
        if let Some(v) = self.tls_certificate_key_file_password {
            config.tls_certificate_key_file_password = Some(v);
        }
        if let Some(v) = self.browser {
            config.browser = Some(v);
        }
        if self.read_only {
            config.read_only = true;
        }
        if self.index_check {
            config.index_check = true;
        }
        if !self.disabled_tools.is_empty() {
            config.disabled_tools = self.disabled_tools;
        }
        if !self.confirmation_required_tools.is_empty() {
            config.confirmation_required_tools = self.confirmation_required_tools;
        }
        if let Some(v) = self.exports_path {
            config.exports_path = v;
        }
        if let Some(v) = self.export_timeout_ms {
            config.export_timeout_ms = v;
        }
        if let Some(v) = self.export_cleanup_interval_ms {
            config.export_cleanup_interval_ms = v;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("mongodb-mcp-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn positional_connection_string_wins_over_flag() {
        let cli = parse(&[
            "mongodb://positional:27017",
            "--connection-string",
            "mongodb://flag:27017",
        ]);
        let mut config = UserConfig::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(
            config.connection_string.as_deref(),
            Some("mongodb://positional:27017")
        );
    }

    #[test]
    fn non_mongodb_positional_is_rejected() {
        let cli = parse(&["not-a-uri"]);
        let mut config = UserConfig::default();
        assert!(matches!(
            cli.apply(&mut config),
            Err(CliError::InvalidPositional)
        ));
    }

    #[test]
    fn unknown_flags_error_out() {
        let result = Cli::try_parse_from(["mongodb-mcp-server", "--reed-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn array_flags_are_comma_split() {
        let cli = parse(&["--disabled-tools", "drop-database,delete-many"]);
        let mut config = UserConfig::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.disabled_tools, vec!["drop-database", "delete-many"]);
    }

    #[test]
    fn invalid_transport_is_rejected() {
        let cli = parse(&["--transport", "websocket"]);
        let mut config = UserConfig::default();
        assert!(matches!(
            cli.apply(&mut config),
            Err(CliError::InvalidTransport(_))
        ));
    }
}
