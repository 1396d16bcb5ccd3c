//! Shared helpers for the integration test suites.

use std::sync::Arc;

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::{LogEnvelope, LogSink, SinkName, TelemetryMode};
use mdbmcp_server::ServerContext;

/// A config rooted in a temp directory, with telemetry off and only the
/// stderr sink so tests never touch real user paths.
pub fn test_config(dir: &tempfile::TempDir) -> UserConfig {
    UserConfig {
        log_path: dir.path().join("logs"),
        exports_path: dir.path().join("exports"),
        loggers: vec![SinkName::Stderr],
        telemetry: TelemetryMode::Disabled,
        ..UserConfig::default()
    }
}

/// A full server context over a temp-dir config.
pub fn test_context(dir: &tempfile::TempDir) -> ServerContext {
    ServerContext::new(Arc::new(test_config(dir)), None).expect("test context")
}

/// Log sink that records every message it receives, per sink identity.
pub struct CaptureSink {
    pub sink_name: SinkName,
    pub messages: Arc<std::sync::Mutex<Vec<String>>>,
}

impl CaptureSink {
    pub fn new(sink_name: SinkName) -> (Arc<dyn LogSink>, Arc<std::sync::Mutex<Vec<String>>>) {
        let messages = Arc::new(std::sync::Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                sink_name,
                messages: messages.clone(),
            }),
            messages,
        )
    }
}

impl LogSink for CaptureSink {
    fn name(&self) -> SinkName {
        self.sink_name
    }

    fn write(&self, _envelope: &LogEnvelope, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}
