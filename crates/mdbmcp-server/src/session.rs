//! Per-client session context.
//!
//! A [`Session`] aggregates everything one MCP client can reach: the
//! connection manager (1:1 lifetime), the exports manager, the Atlas API
//! client, the logger, and the agent's identity. Connection events are
//! re-emitted as session-level events for the transport layer.

use std::sync::{Arc, Mutex};

use mongodb::Client;
use tracing::debug;
use uuid::Uuid;

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::{
    ConnectionEvent, ErrorCode, EventBus, EventReceiver, Keychain, LogId, Logger, SessionEvent,
};

use crate::atlas::AtlasApiClient;
use crate::connection::{AtlasClusterInfo, ConnectionManager, ConnectionSettings, OidcPrompt};
use crate::exports::ExportsManager;

/// Identity the agent supplies during MCP initialization.
#[derive(Debug, Clone)]
pub struct McpClientInfo {
    pub name: String,
    pub version: String,
    pub title: Option<String>,
}

impl Default for McpClientInfo {
    fn default() -> Self {
        Self {
            name: "unknown".to_string(),
            version: "unknown".to_string(),
            title: None,
        }
    }
}

/// Per-client aggregate of the server's moving parts.
pub struct Session {
    pub session_id: Uuid,
    config: Arc<UserConfig>,
    logger: Logger,
    connection_manager: ConnectionManager,
    exports: Arc<ExportsManager>,
    atlas_client: Option<Arc<AtlasApiClient>>,
    mcp_client: Mutex<McpClientInfo>,
    session_events: EventBus<SessionEvent>,
}

impl Session {
    pub fn new(
        config: Arc<UserConfig>,
        logger: Logger,
        connection_manager: ConnectionManager,
        exports: Arc<ExportsManager>,
        atlas_client: Option<Arc<AtlasApiClient>>,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            session_id: Uuid::new_v4(),
            config,
            logger,
            connection_manager,
            exports,
            atlas_client,
            mcp_client: Mutex::new(McpClientInfo::default()),
            session_events: EventBus::new(),
        });
        session.spawn_event_bridge();
        session
    }

    /// Forward connection events as session events. The bridge holds no
    /// strong reference to the session, so dropping the session ends it.
    fn spawn_event_bridge(self: &Arc<Self>) {
        let mut connection_events = self.connection_manager.subscribe();
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = connection_events.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                let session_event = match event {
                    ConnectionEvent::Succeeded => Some(SessionEvent::Connected),
                    ConnectionEvent::Closed => Some(SessionEvent::Disconnected),
                    ConnectionEvent::Errored { reason }
                    | ConnectionEvent::TimedOut { reason } => {
                        Some(SessionEvent::ConnectionError { reason })
                    }
                    ConnectionEvent::Requested { .. } => None,
                };
                if let Some(session_event) = session_event {
                    session.session_events.emit(session_event);
                }
            }
        });
    }

    pub fn config(&self) -> &Arc<UserConfig> {
        &self.config
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn keychain(&self) -> &Keychain {
        self.logger.keychain()
    }

    pub fn connection_manager(&self) -> &ConnectionManager {
        &self.connection_manager
    }

    pub fn exports(&self) -> &Arc<ExportsManager> {
        &self.exports
    }

    pub fn atlas_client(&self) -> Option<&Arc<AtlasApiClient>> {
        self.atlas_client.as_ref()
    }

    pub fn subscribe(&self) -> EventReceiver<SessionEvent> {
        self.session_events.subscribe()
    }

    /// Record the agent's identity and propagate the client name for
    /// `appName` generation.
    pub fn set_mcp_client(&self, info: McpClientInfo) {
        self.connection_manager.set_client_name(info.name.clone());
        *self.mcp_client.lock().unwrap_or_else(|e| e.into_inner()) = info;
    }

    pub fn mcp_client(&self) -> McpClientInfo {
        self.mcp_client
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub async fn connect_to_mongodb(
        &self,
        settings: ConnectionSettings,
    ) -> Result<(), ErrorCode> {
        self.connection_manager.connect(settings).await.map(|_| ())
    }

    pub async fn disconnect(&self) {
        self.connection_manager.disconnect().await;
    }

    /// The driver handle; fails with `NotConnectedToMongoDB` unless the
    /// connection state is `connected`.
    pub async fn service_provider(&self) -> Result<Client, ErrorCode> {
        self.connection_manager.client().await
    }

    pub async fn connected_atlas_cluster(&self) -> Option<AtlasClusterInfo> {
        self.connection_manager.atlas().await
    }

    pub async fn oidc_prompt(&self) -> Option<OidcPrompt> {
        self.connection_manager.oidc_prompt().await
    }

    /// Disconnect, stop exports, and drop the Atlas client.
    pub async fn close(&self) {
        debug!(session_id = %self.session_id, "[Session] Closing");
        self.disconnect().await;
        self.exports.close().await;
        self.logger
            .debug(LogId::SESSION_CLOSED, "session", "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Session> {
        let config = Arc::new(UserConfig::default());
        let logger = Logger::disabled();
        let manager = ConnectionManager::new(config.clone(), logger.clone(), None);
        let exports = ExportsManager::new(config.clone(), logger.clone());
        Session::new(config, logger, manager, exports, None)
    }

    #[tokio::test]
    async fn sessions_get_unique_ids() {
        let a = session();
        let b = session();
        assert_ne!(a.session_id, b.session_id);
    }

    #[tokio::test]
    async fn default_client_info_is_unknown() {
        let session = session();
        assert_eq!(session.mcp_client().name, "unknown");

        session.set_mcp_client(McpClientInfo {
            name: "cursor".into(),
            version: "1.2.3".into(),
            title: None,
        });
        assert_eq!(session.mcp_client().name, "cursor");
    }

    #[tokio::test]
    async fn connection_errors_are_re_emitted_as_session_events() {
        let session = session();
        let mut events = session.subscribe();

        let _ = session
            .connect_to_mongodb(ConnectionSettings::new("mongodb://bad uri with spaces"))
            .await;

        assert!(matches!(
            events.recv().await,
            Some(SessionEvent::ConnectionError { .. })
        ));
    }

    #[tokio::test]
    async fn service_provider_fails_when_disconnected() {
        let session = session();
        assert!(matches!(
            session.service_provider().await,
            Err(ErrorCode::NotConnectedToMongoDB(None))
        ));
    }
}
