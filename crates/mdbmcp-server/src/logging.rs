//! MCP notification log sink.
//!
//! The `mcp` sink forwards log envelopes to the connected agent as
//! `notifications/message`. The peer only exists after initialization,
//! so the sink is constructed empty and bound later through its handle.

use std::sync::{Arc, Mutex};

use rmcp::model::{LoggingLevel, LoggingMessageNotificationParam};
use rmcp::service::{Peer, RoleServer};
use tracing::debug;

use mdbmcp_core::{LogEnvelope, LogLevel, LogSink, SinkName};

#[derive(Default)]
struct McpSinkState {
    peer: Mutex<Option<Peer<RoleServer>>>,
}

/// Late-binding handle; the transport sets the peer after `initialized`.
#[derive(Clone, Default)]
pub struct McpLogSinkHandle {
    state: Arc<McpSinkState>,
}

impl McpLogSinkHandle {
    pub fn bind(&self, peer: Peer<RoleServer>) {
        *self.state.peer.lock().unwrap_or_else(|e| e.into_inner()) = Some(peer);
    }

    pub fn unbind(&self) {
        *self.state.peer.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// The bound peer, once the client has initialized.
    pub fn peer(&self) -> Option<Peer<RoleServer>> {
        self.state
            .peer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// The sink registered with the composite logger.
pub struct McpLogSink {
    state: Arc<McpSinkState>,
}

impl McpLogSink {
    /// Returns the sink and the handle used to bind the peer later.
    pub fn new() -> (Self, McpLogSinkHandle) {
        let handle = McpLogSinkHandle::default();
        (
            Self {
                state: handle.state.clone(),
            },
            handle,
        )
    }
}

impl LogSink for McpLogSink {
    fn name(&self) -> SinkName {
        SinkName::Mcp
    }

    fn write(&self, envelope: &LogEnvelope, message: &str) {
        let peer = self
            .state
            .peer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let Some(peer) = peer else {
            // No client yet; MCP log notifications are fire-and-forget.
            return;
        };

        let params = LoggingMessageNotificationParam {
            level: to_mcp_level(envelope.level),
            logger: Some(envelope.context.to_string()),
            data: serde_json::json!({
                "id": envelope.id.0,
                "message": message,
            }),
        };
        tokio::spawn(async move {
            if let Err(e) = peer.notify_logging_message(params).await {
                debug!("[McpLogSink] Failed to deliver log notification: {e}");
            }
        });
    }
}

fn to_mcp_level(level: LogLevel) -> LoggingLevel {
    match level {
        LogLevel::Debug => LoggingLevel::Debug,
        LogLevel::Info => LoggingLevel::Info,
        LogLevel::Notice => LoggingLevel::Notice,
        LogLevel::Warning => LoggingLevel::Warning,
        LogLevel::Error => LoggingLevel::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdbmcp_core::LogId;

    #[test]
    fn unbound_sink_swallows_messages() {
        let (sink, _handle) = McpLogSink::new();
        // Must not panic or require a runtime when no peer is bound.
        sink.write(
            &LogEnvelope::new(LogLevel::Info, LogId::SERVER_STARTED, "server", "hello"),
            "hello",
        );
    }
}
