//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns exactly one driver handle at a time and is
//! the only place the connection state mutates. Every transition goes
//! through `change_state`, which is also the single broadcast point for
//! [`ConnectionEvent`]s, so observers see transitions in order.

mod oidc;
mod state;

pub use oidc::{DeviceCodePrompt, OidcFlowHandler, OidcToken, OidcTokenRequest, PromptSender};
pub use state::{AtlasClusterInfo, AuthType, ConnectionState, OidcPrompt};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bson::doc;
use futures::FutureExt;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use mongodb::Client;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::{
    ConnectionEvent, ConnectionStateTag, ErrorCode, EventBus, EventReceiver, LogId, Logger,
    SERVER_NAME, SERVER_VERSION,
};

/// Driver hello timeout when the URI doesn't carry one.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Input to [`ConnectionManager::connect`].
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub connection_string: String,
    pub atlas: Option<AtlasClusterInfo>,
}

impl ConnectionSettings {
    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            atlas: None,
        }
    }

    pub fn for_atlas(connection_string: impl Into<String>, atlas: AtlasClusterInfo) -> Self {
        Self {
            connection_string: connection_string.into(),
            atlas: Some(atlas),
        }
    }
}

/// State machine over an authenticated driver handle.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<UserConfig>,
    logger: Logger,
    bus: EventBus<ConnectionEvent>,
    state: RwLock<ConnectionState>,
    /// Serializes connect/disconnect so state mutation is single-file.
    connect_lock: tokio::sync::Mutex<()>,
    /// Monotonic attempt counter; stale async completions are dropped.
    attempt: AtomicU64,
    client_name: Mutex<String>,
    device_id: Mutex<Option<String>>,
    oidc_handler: Option<Arc<dyn OidcFlowHandler>>,
}

impl ConnectionManager {
    pub fn new(
        config: Arc<UserConfig>,
        logger: Logger,
        oidc_handler: Option<Arc<dyn OidcFlowHandler>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                logger,
                bus: EventBus::new(),
                state: RwLock::new(ConnectionState::Disconnected),
                connect_lock: tokio::sync::Mutex::new(()),
                attempt: AtomicU64::new(0),
                client_name: Mutex::new("unknown".to_string()),
                device_id: Mutex::new(None),
                oidc_handler,
            }),
        }
    }

    pub fn subscribe(&self) -> EventReceiver<ConnectionEvent> {
        self.inner.bus.subscribe()
    }

    pub async fn current_state(&self) -> ConnectionState {
        self.inner.state.read().await.clone()
    }

    pub async fn state_tag(&self) -> ConnectionStateTag {
        self.inner.state.read().await.tag()
    }

    /// The driver handle, available only while `connected`.
    pub async fn client(&self) -> Result<Client, ErrorCode> {
        self.inner
            .state
            .read()
            .await
            .client()
            .cloned()
            .ok_or(ErrorCode::NotConnectedToMongoDB(None))
    }

    pub async fn oidc_prompt(&self) -> Option<OidcPrompt> {
        self.inner.state.read().await.oidc_prompt().cloned()
    }

    pub async fn atlas(&self) -> Option<AtlasClusterInfo> {
        self.inner.state.read().await.atlas().cloned()
    }

    /// Record the MCP client's name for appName generation.
    pub fn set_client_name(&self, name: impl Into<String>) {
        *self.inner.client_name.lock().unwrap_or_else(|e| e.into_inner()) = name.into();
    }

    pub fn set_device_id(&self, device_id: impl Into<String>) {
        *self.inner.device_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(device_id.into());
    }

    /// Connect to the deployment described by `settings`.
    ///
    /// Returns the post-transition state tag: `Connected` for synchronous
    /// auth mechanisms, `Connecting` when an OIDC flow is pending.
    pub async fn connect(
        &self,
        settings: ConnectionSettings,
    ) -> Result<ConnectionStateTag, ErrorCode> {
        let _guard = self.inner.connect_lock.lock().await;

        let previous = self.inner.state.read().await.tag();
        self.inner
            .bus
            .emit(ConnectionEvent::Requested { previous });
        self.inner.logger.info(
            LogId::CONNECT_ATTEMPT,
            "connection",
            format!("Connecting to {}", settings.connection_string),
        );

        if matches!(
            previous,
            ConnectionStateTag::Connected | ConnectionStateTag::Connecting
        ) {
            self.disconnect_locked().await;
        }

        let attempt = self.inner.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let atlas = settings.atlas.clone();

        let mut options = match ClientOptions::parse(&settings.connection_string).await {
            Ok(options) => options,
            Err(e) => {
                return Err(self
                    .fail_attempt(
                        ErrorCode::MisconfiguredConnectionString(e.to_string()),
                        None,
                        atlas,
                        false,
                    )
                    .await);
            }
        };

        self.apply_default_options(&mut options);
        let auth_type = AuthType::infer(&options, &self.inner.config);

        if auth_type.is_oidc() {
            if let Err(e) = self.install_oidc_callback(&mut options, auth_type, attempt) {
                return Err(self.fail_attempt(e, Some(auth_type), atlas, false).await);
            }
        }

        let client = match Client::with_options(options) {
            Ok(client) => client,
            Err(e) => {
                return Err(self
                    .fail_attempt(
                        ErrorCode::MisconfiguredConnectionString(e.to_string()),
                        Some(auth_type),
                        atlas,
                        false,
                    )
                    .await);
            }
        };

        if auth_type.is_oidc() {
            // The handshake completes on the OIDC co-flow's schedule; run
            // `hello` in the background and let its outcome drive the
            // terminal transition.
            self.change_state(
                ConnectionState::Connecting {
                    client: client.clone(),
                    auth_type,
                    oidc: None,
                    atlas: atlas.clone(),
                },
                None,
            )
            .await;

            let inner = self.inner.clone();
            let atlas_for_task = atlas.clone();
            tokio::spawn(async move {
                let result = client.database("admin").run_command(doc! { "hello": 1 }).await;
                Inner::complete_oidc_attempt(&inner, attempt, auth_type, atlas_for_task, result)
                    .await;
            });
            return Ok(ConnectionStateTag::Connecting);
        }

        match client.database("admin").run_command(doc! { "hello": 1 }).await {
            Ok(_) => {
                self.change_state(
                    ConnectionState::Connected {
                        client,
                        auth_type,
                        atlas,
                    },
                    Some(ConnectionEvent::Succeeded),
                )
                .await;
                self.inner.logger.info(
                    LogId::CONNECT_SUCCEEDED,
                    "connection",
                    "Connected to MongoDB",
                );
                Ok(ConnectionStateTag::Connected)
            }
            Err(e) => {
                let timed_out =
                    matches!(*e.kind, mongodb::error::ErrorKind::ServerSelection { .. });
                client.shutdown().immediate(true).await;
                Err(self
                    .fail_attempt(
                        ErrorCode::NotConnectedToMongoDB(Some(e.to_string())),
                        Some(auth_type),
                        atlas,
                        timed_out,
                    )
                    .await)
            }
        }
    }

    /// Close the driver handle, if any, and settle in `disconnected`.
    /// Idempotent for `disconnected`/`errored`.
    pub async fn disconnect(&self) {
        let _guard = self.inner.connect_lock.lock().await;
        self.disconnect_locked().await;
    }

    async fn disconnect_locked(&self) {
        let current = {
            let state = self.inner.state.read().await;
            state.tag()
        };
        if !matches!(
            current,
            ConnectionStateTag::Connected | ConnectionStateTag::Connecting
        ) {
            return;
        }

        // Invalidate any in-flight attempt before the handle closes.
        self.inner.attempt.fetch_add(1, Ordering::SeqCst);

        let client = self.inner.state.read().await.any_client().cloned();
        if let Some(client) = client {
            // Exports may still hold cursors; don't wait on them.
            client.shutdown().immediate(true).await;
        }
        self.change_state(ConnectionState::Disconnected, Some(ConnectionEvent::Closed))
            .await;
        self.inner
            .logger
            .debug(LogId::DISCONNECT, "connection", "Disconnected from MongoDB");
    }

    /// The single mutation + broadcast point for the state machine.
    async fn change_state(&self, new_state: ConnectionState, event: Option<ConnectionEvent>) {
        {
            let mut state = self.inner.state.write().await;
            debug!(from = ?state.tag(), to = ?new_state.tag(), "[ConnectionManager] State change");
            *state = new_state;
        }
        if let Some(event) = event {
            self.inner.bus.emit(event);
        }
    }

    async fn fail_attempt(
        &self,
        error: ErrorCode,
        auth_type: Option<AuthType>,
        atlas: Option<AtlasClusterInfo>,
        timed_out: bool,
    ) -> ErrorCode {
        let reason = error.to_string();
        self.inner.logger.error(
            LogId::CONNECT_FAILED,
            "connection",
            format!("Connection failed: {reason}"),
        );
        let event = if timed_out {
            ConnectionEvent::TimedOut {
                reason: reason.clone(),
            }
        } else {
            ConnectionEvent::Errored {
                reason: reason.clone(),
            }
        };
        self.change_state(
            ConnectionState::Errored {
                reason,
                auth_type,
                atlas,
            },
            Some(event),
        )
        .await;
        error
    }

    fn apply_default_options(&self, options: &mut ClientOptions) {
        if options.app_name.is_none() {
            options.app_name = Some(self.app_name());
        }
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
        }

        let config = &self.inner.config;
        if options.tls.is_none()
            && (config.tls_ca_file.is_some() || config.tls_certificate_key_file.is_some())
        {
            let mut tls = TlsOptions::default();
            tls.ca_file_path = config.tls_ca_file.as_ref().map(Into::into);
            tls.cert_key_file_path = config.tls_certificate_key_file.as_ref().map(Into::into);
            options.tls = Some(Tls::Enabled(tls));
        }
    }

    fn app_name(&self) -> String {
        let client_name = self
            .inner
            .client_name
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let device_id = self
            .inner
            .device_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let device_short = &device_id[..device_id.len().min(8)];
        format!("{SERVER_NAME} {SERVER_VERSION} ({device_short}; {client_name})")
    }

    fn install_oidc_callback(
        &self,
        options: &mut ClientOptions,
        auth_type: AuthType,
        attempt: u64,
    ) -> Result<(), ErrorCode> {
        let handler = self.inner.oidc_handler.clone().ok_or_else(|| {
            ErrorCode::MisconfiguredConnectionString(
                "authMechanism=MONGODB-OIDC requires an OIDC flow handler".to_string(),
            )
        })?;
        let Some(credential) = options.credential.as_mut() else {
            return Err(ErrorCode::MisconfiguredConnectionString(
                "MONGODB-OIDC connection string is missing credential information".to_string(),
            ));
        };

        let (prompt_tx, mut prompt_rx) = mpsc::unbounded_channel::<DeviceCodePrompt>();

        // Prompt listener: surfaces device-code data in the connecting state.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(prompt) = prompt_rx.recv().await {
                Inner::note_oidc_prompt(&inner, attempt, auth_type, prompt).await;
            }
        });

        let browser = self.inner.config.browser.clone();
        credential.oidc_callback = mongodb::options::oidc::Callback::human(
            move |context: mongodb::options::oidc::CallbackContext| {
                let handler = handler.clone();
                let prompt_tx = prompt_tx.clone();
                let browser = browser.clone();
                async move {
                    let request = OidcTokenRequest {
                        flow: auth_type,
                        issuer: context.idp_info.as_ref().map(|info| info.issuer.clone()),
                        client_id: context
                            .idp_info
                            .as_ref()
                            .and_then(|info| info.client_id.clone()),
                        request_scopes: context
                            .idp_info
                            .as_ref()
                            .and_then(|info| info.request_scopes.clone()),
                        refresh_token: context.refresh_token.clone(),
                        browser,
                    };
                    let token = handler
                        .acquire_token(request, prompt_tx)
                        .await
                        .map_err(mongodb::error::Error::custom)?;
                    Ok(mongodb::options::oidc::IdpServerResponse::builder()
                        .access_token(token.access_token)
                        .expires(token.expires)
                        .refresh_token(token.refresh_token)
                        .build())
                }
                .boxed()
            },
        );
        Ok(())
    }
}

impl Inner {
    fn current_attempt(&self) -> u64 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Record a device-code prompt on the in-flight attempt and re-emit
    /// `connection-requested` so observers learn about the prompt.
    async fn note_oidc_prompt(
        inner: &Arc<Inner>,
        attempt: u64,
        auth_type: AuthType,
        prompt: DeviceCodePrompt,
    ) {
        if inner.current_attempt() != attempt {
            return;
        }
        let mut state = inner.state.write().await;
        if let ConnectionState::Connecting { oidc, .. } = &mut *state {
            *oidc = Some(OidcPrompt {
                flow: auth_type,
                login_url: Some(prompt.verification_url.clone()),
                user_code: Some(prompt.user_code.clone()),
            });
            drop(state);
            inner.logger.info(
                LogId::OIDC_FLOW,
                "connection",
                format!(
                    "OIDC device flow: visit {} and enter code {}",
                    prompt.verification_url, prompt.user_code
                ),
            );
            inner.bus.emit(ConnectionEvent::Requested {
                previous: ConnectionStateTag::Connecting,
            });
        }
    }

    /// Terminal transition for an OIDC attempt, driven by the background
    /// `hello`. Stale completions (a newer connect or a disconnect
    /// happened meanwhile) are dropped.
    async fn complete_oidc_attempt(
        inner: &Arc<Inner>,
        attempt: u64,
        auth_type: AuthType,
        atlas: Option<AtlasClusterInfo>,
        result: mongodb::error::Result<bson::Document>,
    ) {
        if inner.current_attempt() != attempt {
            debug!("[ConnectionManager] Dropping stale OIDC completion");
            return;
        }

        let mut state = inner.state.write().await;
        let ConnectionState::Connecting { client, .. } = &*state else {
            return;
        };
        let client = client.clone();

        match result {
            Ok(_) => {
                *state = ConnectionState::Connected {
                    client,
                    auth_type,
                    atlas,
                };
                drop(state);
                inner
                    .logger
                    .info(LogId::CONNECT_SUCCEEDED, "connection", "Connected to MongoDB");
                inner.bus.emit(ConnectionEvent::Succeeded);
            }
            Err(e) => {
                let reason = e.to_string();
                *state = ConnectionState::Errored {
                    reason: reason.clone(),
                    auth_type: Some(auth_type),
                    atlas,
                };
                drop(state);
                client.shutdown().immediate(true).await;
                inner.logger.error(
                    LogId::CONNECT_FAILED,
                    "connection",
                    format!("OIDC authentication failed: {reason}"),
                );
                inner.bus.emit(ConnectionEvent::Errored { reason });
            }
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ConnectionManager {
        ConnectionManager::new(Arc::new(UserConfig::default()), Logger::disabled(), None)
    }

    #[tokio::test]
    async fn initial_state_is_disconnected() {
        let manager = manager();
        assert_eq!(manager.state_tag().await, ConnectionStateTag::Disconnected);
        assert!(manager.client().await.is_err());
    }

    #[tokio::test]
    async fn connect_with_unparsable_uri_errors_and_emits_events() {
        let manager = manager();
        let mut events = manager.subscribe();

        let result = manager
            .connect(ConnectionSettings::new("mongodb://bad uri with spaces"))
            .await;
        assert!(matches!(
            result,
            Err(ErrorCode::MisconfiguredConnectionString(_))
        ));
        assert_eq!(manager.state_tag().await, ConnectionStateTag::Errored);

        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Requested {
                previous: ConnectionStateTag::Disconnected
            })
        );
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Errored { .. })
        ));
    }

    #[tokio::test]
    async fn oidc_without_handler_is_a_misconfiguration() {
        let manager = manager();
        let result = manager
            .connect(ConnectionSettings::new(
                "mongodb://localhost:27017/?authMechanism=MONGODB-OIDC&authSource=$external",
            ))
            .await;
        assert!(matches!(
            result,
            Err(ErrorCode::MisconfiguredConnectionString(_))
        ));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_when_disconnected() {
        let manager = manager();
        let mut events = manager.subscribe();
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state_tag().await, ConnectionStateTag::Disconnected);
        assert_eq!(events.try_recv(), None);
    }

    #[tokio::test]
    async fn errored_state_preserves_atlas_info() {
        let manager = manager();
        let atlas = AtlasClusterInfo {
            project_id: "p1".into(),
            cluster_name: "Cluster0".into(),
            username: "temp-user".into(),
            expiry_date: chrono::Utc::now(),
        };
        let _ = manager
            .connect(ConnectionSettings::for_atlas(
                "mongodb://bad uri with spaces",
                atlas.clone(),
            ))
            .await;
        assert_eq!(manager.atlas().await, Some(atlas));
    }
}
