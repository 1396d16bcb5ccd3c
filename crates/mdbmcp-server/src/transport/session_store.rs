//! Per-session bookkeeping for the streamable HTTP transport.
//!
//! Tracks one entry per wire session: the handler (and through it the
//! app-level session), the last-seen timestamp, and the keep-alive task.
//! A reaper loop enforces the idle timeout and sends the pre-expiry
//! warning; a per-session loop sends JSON-RPC pings and closes the
//! transport after three consecutive failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::SessionManager;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::LogId;

use crate::handler::McpServerHandler;
use crate::logging::McpLogSinkHandle;

/// Keep-alive ping cadence.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
/// Consecutive ping failures before the transport is closed.
const KEEP_ALIVE_MAX_FAILURES: u32 = 3;
/// Reaper cadence for idle/notification deadlines.
const REAPER_INTERVAL: Duration = Duration::from_secs(5);

struct SessionEntry {
    handler: McpServerHandler,
    sink_handle: McpLogSinkHandle,
    last_seen: Instant,
    warned: bool,
    keep_alive: tokio::task::JoinHandle<()>,
}

struct StoreInner {
    config: Arc<UserConfig>,
    entries: RwLock<HashMap<String, SessionEntry>>,
    session_manager: Arc<LocalSessionManager>,
    shutdown: CancellationToken,
}

/// Shared map of live HTTP sessions.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    pub fn new(config: Arc<UserConfig>, session_manager: Arc<LocalSessionManager>) -> Self {
        let store = Self {
            inner: Arc::new(StoreInner {
                config,
                entries: RwLock::new(HashMap::new()),
                session_manager,
                shutdown: CancellationToken::new(),
            }),
        };
        store.spawn_reaper();
        store
    }

    /// Track a freshly initialized wire session.
    pub async fn register(
        &self,
        session_id: String,
        handler: McpServerHandler,
        sink_handle: McpLogSinkHandle,
    ) {
        info!(session_id = %session_id, "[SessionStore] Session registered");
        let keep_alive = self.spawn_keep_alive(session_id.clone(), sink_handle.clone());
        let entry = SessionEntry {
            handler,
            sink_handle,
            last_seen: Instant::now(),
            warned: false,
            keep_alive,
        };
        if let Some(previous) = self
            .inner
            .entries
            .write()
            .await
            .insert(session_id, entry)
        {
            previous.keep_alive.abort();
        }
    }

    /// Refresh the idle timers. Returns false for unknown sessions.
    pub async fn touch(&self, session_id: &str) -> bool {
        let mut entries = self.inner.entries.write().await;
        match entries.get_mut(session_id) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                entry.warned = false;
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.entries.read().await.contains_key(session_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    /// Close one session: cancel its keep-alive, close the app session,
    /// and drop the wire session.
    pub async fn close_session(&self, session_id: &str, reason: &str) {
        let entry = self.inner.entries.write().await.remove(session_id);
        let Some(entry) = entry else {
            return;
        };
        info!(session_id = %session_id, reason, "[SessionStore] Closing session");
        entry.keep_alive.abort();
        entry.sink_handle.unbind();
        entry.handler.session().close().await;

        let wire_id: Arc<str> = Arc::from(session_id);
        if let Err(e) = self.inner.session_manager.close_session(&wire_id).await {
            debug!(session_id = %session_id, "[SessionStore] Wire session close: {e}");
        }
    }

    /// Remove a session that the client terminated itself (DELETE /mcp);
    /// the wire session is already gone.
    pub async fn forget(&self, session_id: &str) {
        let entry = self.inner.entries.write().await.remove(session_id);
        if let Some(entry) = entry {
            info!(session_id = %session_id, "[SessionStore] Session terminated by client");
            entry.keep_alive.abort();
            entry.sink_handle.unbind();
            entry.handler.session().close().await;
        }
    }

    pub async fn close_all(&self) {
        self.inner.shutdown.cancel();
        let ids: Vec<String> = self.inner.entries.read().await.keys().cloned().collect();
        for id in ids {
            self.close_session(&id, "server shutdown").await;
        }
    }

    /// Idle/notification deadlines, enforced on a coarse tick. Every
    /// incoming request resets both through [`SessionStore::touch`].
    fn spawn_reaper(&self) {
        let store = self.clone();
        let cancel = self.inner.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAPER_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = cancel.cancelled() => break,
                }
                store.reap().await;
            }
        });
    }

    async fn reap(&self) {
        let idle_after = Duration::from_millis(self.inner.config.idle_timeout_ms);
        let warn_after = Duration::from_millis(self.inner.config.notification_timeout_ms);
        let now = Instant::now();

        let mut to_close = Vec::new();
        {
            let mut entries = self.inner.entries.write().await;
            for (id, entry) in entries.iter_mut() {
                let idle_for = now.duration_since(entry.last_seen);
                if idle_for >= idle_after {
                    to_close.push(id.clone());
                } else if idle_for >= warn_after && !entry.warned {
                    entry.warned = true;
                    entry.handler.session().logger().log(
                        mdbmcp_core::LogEnvelope::new(
                            mdbmcp_core::LogLevel::Warning,
                            LogId::SESSION_EXPIRY_WARNING,
                            "session",
                            "This session has been idle and will be closed soon; send any \
                             request to keep it alive.",
                        ),
                    );
                }
            }
        }

        for id in to_close {
            self.close_session(&id, "idle timeout").await;
        }
    }

    /// JSON-RPC ping loop. Starts once the peer is bound (after
    /// `initialized`) and closes the transport after three consecutive
    /// failures.
    fn spawn_keep_alive(
        &self,
        session_id: String,
        sink_handle: McpLogSinkHandle,
    ) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEP_ALIVE_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so pings start a
            // full interval after initialization.
            ticker.tick().await;

            let mut failures: u32 = 0;
            loop {
                ticker.tick().await;
                let Some(peer) = sink_handle.peer() else {
                    continue;
                };
                let ping = rmcp::model::ServerRequest::PingRequest(Default::default());
                match peer.send_request(ping).await {
                    Ok(_) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        warn!(
                            session_id = %session_id,
                            failures,
                            "[SessionStore] Keep-alive ping failed: {e}"
                        );
                        if failures >= KEEP_ALIVE_MAX_FAILURES {
                            store.close_session(&session_id, "keep-alive failed").await;
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerContext;
    use mdbmcp_core::SinkName;

    fn test_context() -> ServerContext {
        let dir = tempfile::tempdir().unwrap();
        let config = UserConfig {
            log_path: dir.path().join("logs"),
            exports_path: dir.path().join("exports"),
            loggers: vec![SinkName::Stderr],
            telemetry: mdbmcp_core::TelemetryMode::Disabled,
            idle_timeout_ms: 50,
            notification_timeout_ms: 10,
            ..UserConfig::default()
        };
        ServerContext::new(Arc::new(config), None).unwrap()
    }

    fn store_for(context: &ServerContext) -> SessionStore {
        SessionStore::new(
            context.config().clone(),
            Arc::new(LocalSessionManager::default()),
        )
    }

    #[tokio::test]
    async fn touch_unknown_session_is_false() {
        let context = test_context();
        let store = store_for(&context);
        assert!(!store.touch("nope").await);
    }

    #[tokio::test]
    async fn register_touch_and_forget_lifecycle() {
        let context = test_context();
        let store = store_for(&context);
        let (handler, sink) = context.new_handler();

        store.register("s1".to_string(), handler, sink).await;
        assert!(store.contains("s1").await);
        assert!(store.touch("s1").await);

        store.forget("s1").await;
        assert!(!store.contains("s1").await);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn reap_closes_idle_sessions() {
        let context = test_context();
        let store = store_for(&context);
        let (handler, sink) = context.new_handler();
        store.register("s1".to_string(), handler, sink).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        store.reap().await;
        assert!(!store.contains("s1").await);
    }
}
