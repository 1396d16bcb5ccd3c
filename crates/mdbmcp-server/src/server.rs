//! Process-wide assembly.
//!
//! [`ServerContext`] owns everything that outlives a single MCP session
//! (config, keychain, shared log sinks, telemetry, the Atlas client) and
//! stamps out per-session handlers: each handler gets its own Session,
//! ConnectionManager, ExportsManager, tool registry, and mcp log sink.

use std::sync::Arc;

use anyhow::{Context, Result};

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::logging::{DiskSink, StderrSink};
use mdbmcp_core::{Keychain, LogSink, Logger, SinkName};

use crate::atlas::AtlasApiClient;
use crate::connection::{ConnectionManager, OidcFlowHandler};
use crate::exports::ExportsManager;
use crate::handler::McpServerHandler;
use crate::logging::{McpLogSink, McpLogSinkHandle};
use crate::session::Session;
use crate::telemetry::TelemetryService;
use crate::tools::{Dispatcher, ToolRegistry};

/// Everything shared across sessions.
pub struct ServerContext {
    config: Arc<UserConfig>,
    keychain: Keychain,
    /// Sinks every session logger starts from (stderr/disk per config).
    base_sinks: Vec<Arc<dyn LogSink>>,
    telemetry: Arc<TelemetryService>,
    atlas_client: Option<Arc<AtlasApiClient>>,
    oidc_handler: Option<Arc<dyn OidcFlowHandler>>,
}

impl ServerContext {
    /// Build the shared context. Fails only on unusable disk-log paths;
    /// everything else is degraded, not fatal.
    pub fn new(
        config: Arc<UserConfig>,
        oidc_handler: Option<Arc<dyn OidcFlowHandler>>,
    ) -> Result<Self> {
        let keychain = Keychain::new();
        config.register_secrets(&keychain);

        let mut base_sinks: Vec<Arc<dyn LogSink>> = Vec::new();
        for sink in &config.loggers {
            match sink {
                SinkName::Stderr => base_sinks.push(Arc::new(StderrSink)),
                SinkName::Disk => base_sinks.push(Arc::new(
                    DiskSink::new(&config.log_path).context("Failed to open disk log sink")?,
                )),
                // The mcp sink is per-session; created in new_handler.
                SinkName::Mcp => {}
            }
        }

        let base_logger = Logger::new(keychain.clone(), base_sinks.clone());
        let telemetry = TelemetryService::new(config.clone(), base_logger);
        telemetry.update_common(|common| {
            common.transport = Some(
                match config.transport {
                    mdbmcp_core::TransportKind::Stdio => "stdio",
                    mdbmcp_core::TransportKind::Http => "http",
                }
                .to_string(),
            );
            common.config_read_only = Some(config.read_only);
            common.config_index_check = Some(config.index_check);
        });

        let atlas_client = match (&config.api_client_id, &config.api_client_secret) {
            (Some(id), Some(secret)) => Some(AtlasApiClient::new(
                config.api_base_url.clone(),
                id.clone(),
                secret.clone(),
            )),
            _ => None,
        };

        Ok(Self {
            config,
            keychain,
            base_sinks,
            telemetry,
            atlas_client,
            oidc_handler,
        })
    }

    pub fn config(&self) -> &Arc<UserConfig> {
        &self.config
    }

    pub fn telemetry(&self) -> &Arc<TelemetryService> {
        &self.telemetry
    }

    /// A fresh per-session handler with its own session, connection
    /// manager, exports manager, and registry.
    pub fn new_handler(&self) -> (McpServerHandler, McpLogSinkHandle) {
        let (mcp_sink, mcp_sink_handle) = McpLogSink::new();
        let mut logger = Logger::new(self.keychain.clone(), self.base_sinks.clone());
        if self.config.loggers.contains(&SinkName::Mcp) {
            logger = logger.with_sink(Arc::new(mcp_sink));
        }

        let connection_manager = ConnectionManager::new(
            self.config.clone(),
            logger.clone(),
            self.oidc_handler.clone(),
        );
        if let Some(device_id) = self.telemetry.device_id() {
            connection_manager.set_device_id(device_id);
        }

        let exports = ExportsManager::new(self.config.clone(), logger.clone());
        let session = Session::new(
            self.config.clone(),
            logger.clone(),
            connection_manager,
            exports,
            self.atlas_client.clone(),
        );

        let registry = ToolRegistry::with_default_tools(
            &self.config,
            &logger,
            self.atlas_client.is_some(),
        );
        let dispatcher = Dispatcher::new(registry, self.telemetry.clone(), logger);

        (
            McpServerHandler::new(
                session,
                dispatcher,
                self.telemetry.clone(),
                mcp_sink_handle.clone(),
            ),
            mcp_sink_handle,
        )
    }

    /// Final teardown: flush telemetry and stop its background task.
    pub async fn close(&self) {
        self.telemetry.flush().await;
        self.telemetry.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ServerContext {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig {
            log_path: dir.path().join("logs"),
            exports_path: dir.path().join("exports"),
            loggers: vec![SinkName::Stderr],
            telemetry: mdbmcp_core::TelemetryMode::Disabled,
            ..UserConfig::default()
        };
        ServerContext::new(Arc::new(config), None).unwrap()
    }

    #[tokio::test]
    async fn handlers_get_distinct_sessions() {
        let context = context();
        let (a, _) = context.new_handler();
        let (b, _) = context.new_handler();
        assert_ne!(a.session().session_id, b.session().session_id);
    }

    #[tokio::test]
    async fn atlas_client_requires_both_credentials() {
        let context = context();
        assert!(context.atlas_client.is_none());
    }
}
