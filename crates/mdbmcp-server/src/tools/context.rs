//! Shared execution context handed to every tool body.

use std::sync::Arc;

use mongodb::Client;

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::ErrorCode;

use crate::connection::ConnectionSettings;
use crate::session::Session;

/// Everything a tool body may touch.
#[derive(Clone)]
pub struct ToolContext {
    pub session: Arc<Session>,
}

impl ToolContext {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn config(&self) -> &Arc<UserConfig> {
        self.session.config()
    }

    /// Resolve a usable driver handle for a MongoDB tool.
    ///
    /// - `connected` → the handle.
    /// - OIDC prompt pending → surface it so the agent can relay it.
    /// - Atlas connect flow in flight → "still connecting" error.
    /// - A configured connection string → one implicit connect attempt.
    /// - Otherwise → not connected.
    pub async fn ensure_connected(&self) -> Result<Client, ErrorCode> {
        if let Ok(client) = self.session.service_provider().await {
            return Ok(client);
        }

        if let Some(prompt) = self.session.oidc_prompt().await {
            return Err(ErrorCode::OidcInProgress {
                login_url: prompt.login_url,
                user_code: prompt.user_code,
            });
        }

        if self.session.connected_atlas_cluster().await.is_some() {
            return Err(ErrorCode::NotConnectedToMongoDB(Some(
                "still connecting to your Atlas cluster, try again in a few seconds".to_string(),
            )));
        }

        if let Some(connection_string) = self.config().connection_string.clone() {
            // A configured-but-broken URI is a user configuration problem,
            // whatever the manager said.
            self.session
                .connect_to_mongodb(ConnectionSettings::new(connection_string))
                .await
                .map_err(|e| match e {
                    misconfigured @ ErrorCode::MisconfiguredConnectionString(_) => misconfigured,
                    other => ErrorCode::MisconfiguredConnectionString(other.to_string()),
                })?;
            return self.session.service_provider().await;
        }

        Err(ErrorCode::NotConnectedToMongoDB(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionManager;
    use crate::exports::ExportsManager;
    use mdbmcp_core::Logger;

    fn context_with(config: UserConfig) -> ToolContext {
        let config = Arc::new(config);
        let logger = Logger::disabled();
        let manager = ConnectionManager::new(config.clone(), logger.clone(), None);
        let exports = ExportsManager::new(config.clone(), logger.clone());
        ToolContext::new(Session::new(config, logger, manager, exports, None))
    }

    #[tokio::test]
    async fn no_connection_and_no_config_fails_plainly() {
        let ctx = context_with(UserConfig::default());
        assert!(matches!(
            ctx.ensure_connected().await,
            Err(ErrorCode::NotConnectedToMongoDB(None))
        ));
    }

    #[tokio::test]
    async fn configured_bad_connection_string_translates_to_misconfiguration() {
        let ctx = context_with(UserConfig {
            connection_string: Some("mongodb://bad uri with spaces".to_string()),
            ..UserConfig::default()
        });
        assert!(matches!(
            ctx.ensure_connected().await,
            Err(ErrorCode::MisconfiguredConnectionString(_))
        ));
    }
}
