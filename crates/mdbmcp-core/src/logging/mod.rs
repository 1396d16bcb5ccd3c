//! Composite logger with per-sink redaction.
//!
//! Every component logs through [`Logger`], which fans a [`LogEnvelope`]
//! out to the configured sinks (stderr, disk, mcp). Each sink decides
//! independently whether to redact, comparing the envelope's
//! [`RedactionHint`] with its own identity. The default is to redact on
//! every sink except the MCP notification sink, whose consumer is the
//! agent that supplied the secrets in the first place.

pub mod redaction;
mod sinks;

pub use sinks::{cleanup_disk_logs, DiskSink, StderrSink};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::keychain::Keychain;

/// Stable numeric id attached to each log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogId(pub u32);

impl LogId {
    pub const SERVER_STARTED: LogId = LogId(1_000_001);
    pub const SERVER_CLOSED: LogId = LogId(1_000_002);
    pub const SERVER_CLOSE_FAILURE: LogId = LogId(1_000_003);
    pub const CONNECT_ATTEMPT: LogId = LogId(1_000_010);
    pub const CONNECT_SUCCEEDED: LogId = LogId(1_000_011);
    pub const CONNECT_FAILED: LogId = LogId(1_000_012);
    pub const DISCONNECT: LogId = LogId(1_000_013);
    pub const OIDC_FLOW: LogId = LogId(1_000_014);
    pub const TOOL_EXECUTE: LogId = LogId(1_000_020);
    pub const TOOL_EXECUTE_FAILURE: LogId = LogId(1_000_021);
    pub const TOOL_DISABLED: LogId = LogId(1_000_022);
    pub const EXPORT_CREATED: LogId = LogId(1_000_030);
    pub const EXPORT_FINISHED: LogId = LogId(1_000_031);
    pub const EXPORT_CLEANUP: LogId = LogId(1_000_032);
    pub const TELEMETRY_EMIT_FAILURE: LogId = LogId(1_000_040);
    pub const DEVICE_ID_TIMEOUT: LogId = LogId(1_000_041);
    pub const SESSION_EXPIRY_WARNING: LogId = LogId(1_000_050);
    pub const SESSION_CLOSED: LogId = LogId(1_000_051);
    pub const KEEP_ALIVE_FAILURE: LogId = LogId(1_000_052);
    pub const ATLAS_CONNECT_FLOW: LogId = LogId(1_000_060);
}

/// Severity, matching the MCP logging levels the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

/// Identity of a log sink, also the values accepted by the `loggers`
/// configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkName {
    Stderr,
    Disk,
    Mcp,
}

impl SinkName {
    pub fn as_str(self) -> &'static str {
        match self {
            SinkName::Stderr => "stderr",
            SinkName::Disk => "disk",
            SinkName::Mcp => "mcp",
        }
    }

    pub fn parse(value: &str) -> Option<SinkName> {
        match value {
            "stderr" => Some(SinkName::Stderr),
            "disk" => Some(SinkName::Disk),
            "mcp" => Some(SinkName::Mcp),
            _ => None,
        }
    }
}

/// Per-message redaction override.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RedactionHint {
    /// Redact on every sink except `mcp`.
    #[default]
    Unspecified,
    /// Redact nowhere.
    Never,
    /// Redact everywhere, including the `mcp` sink.
    Always,
    /// Skip redaction on exactly these sinks.
    Skip(Vec<SinkName>),
}

impl RedactionHint {
    /// Whether a message with this hint must be redacted on `sink`.
    pub fn redact_on(&self, sink: SinkName) -> bool {
        match self {
            RedactionHint::Unspecified => sink != SinkName::Mcp,
            RedactionHint::Never => false,
            RedactionHint::Always => true,
            RedactionHint::Skip(sinks) => !sinks.contains(&sink),
        }
    }
}

/// One log message on its way to the sinks.
#[derive(Debug, Clone)]
pub struct LogEnvelope {
    pub id: LogId,
    pub context: &'static str,
    pub level: LogLevel,
    pub message: String,
    pub no_redaction: RedactionHint,
}

impl LogEnvelope {
    pub fn new(
        level: LogLevel,
        id: LogId,
        context: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id,
            context,
            level,
            message: message.into(),
            no_redaction: RedactionHint::default(),
        }
    }

    pub fn with_redaction(mut self, hint: RedactionHint) -> Self {
        self.no_redaction = hint;
        self
    }
}

/// A destination for log envelopes. Implementations must be cheap and
/// non-blocking; slow consumers buffer internally.
pub trait LogSink: Send + Sync {
    fn name(&self) -> SinkName;
    fn write(&self, envelope: &LogEnvelope, message: &str);
}

/// Composite logger: applies per-sink redaction and fans out.
///
/// Sinks are reference-counted so a session logger can extend the
/// process-wide sinks with its own (e.g. the per-peer mcp sink).
#[derive(Clone)]
pub struct Logger {
    keychain: Keychain,
    sinks: Vec<Arc<dyn LogSink>>,
}

impl Logger {
    pub fn new(keychain: Keychain, sinks: Vec<Arc<dyn LogSink>>) -> Self {
        Self { keychain, sinks }
    }

    /// A logger with no sinks; useful before config resolution and in tests.
    pub fn disabled() -> Self {
        Self::new(Keychain::new(), Vec::new())
    }

    /// A derived logger with one extra sink appended.
    pub fn with_sink(&self, sink: Arc<dyn LogSink>) -> Self {
        let mut sinks = self.sinks.clone();
        sinks.push(sink);
        Self {
            keychain: self.keychain.clone(),
            sinks,
        }
    }

    pub fn keychain(&self) -> &Keychain {
        &self.keychain
    }

    pub fn log(&self, envelope: LogEnvelope) {
        let mut redacted: Option<String> = None;
        for sink in self.sinks.iter() {
            if envelope.no_redaction.redact_on(sink.name()) {
                let message = redacted
                    .get_or_insert_with(|| self.keychain.redact(&envelope.message))
                    .clone();
                sink.write(&envelope, &message);
            } else {
                sink.write(&envelope, &envelope.message);
            }
        }
    }

    pub fn debug(&self, id: LogId, context: &'static str, message: impl Into<String>) {
        self.log(LogEnvelope::new(LogLevel::Debug, id, context, message));
    }

    pub fn info(&self, id: LogId, context: &'static str, message: impl Into<String>) {
        self.log(LogEnvelope::new(LogLevel::Info, id, context, message));
    }

    pub fn warn(&self, id: LogId, context: &'static str, message: impl Into<String>) {
        self.log(LogEnvelope::new(LogLevel::Warning, id, context, message));
    }

    pub fn error(&self, id: LogId, context: &'static str, message: impl Into<String>) {
        self.log(LogEnvelope::new(LogLevel::Error, id, context, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::SecretKind;
    use std::sync::Mutex;

    struct CaptureSink {
        sink_name: SinkName,
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl LogSink for CaptureSink {
        fn name(&self) -> SinkName {
            self.sink_name
        }

        fn write(&self, _envelope: &LogEnvelope, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    fn capture(sink_name: SinkName) -> (Arc<dyn LogSink>, Arc<Mutex<Vec<String>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(CaptureSink {
                sink_name,
                messages: messages.clone(),
            }),
            messages,
        )
    }

    #[test]
    fn default_hint_redacts_everywhere_except_mcp() {
        let keychain = Keychain::new();
        keychain.register("s3cr3t", SecretKind::Password);

        let (stderr, stderr_out) = capture(SinkName::Stderr);
        let (mcp, mcp_out) = capture(SinkName::Mcp);
        let logger = Logger::new(keychain, vec![stderr, mcp]);

        logger.info(LogId::CONNECT_ATTEMPT, "connection", "password is s3cr3t");

        assert_eq!(stderr_out.lock().unwrap()[0], "password is <password>");
        assert_eq!(mcp_out.lock().unwrap()[0], "password is s3cr3t");
    }

    #[test]
    fn always_hint_redacts_mcp_too() {
        let keychain = Keychain::new();
        keychain.register("s3cr3t", SecretKind::Password);
        let (mcp, mcp_out) = capture(SinkName::Mcp);
        let logger = Logger::new(keychain, vec![mcp]);

        logger.log(
            LogEnvelope::new(
                LogLevel::Info,
                LogId::CONNECT_ATTEMPT,
                "connection",
                "password is s3cr3t",
            )
            .with_redaction(RedactionHint::Always),
        );

        assert_eq!(mcp_out.lock().unwrap()[0], "password is <password>");
    }

    #[test]
    fn skip_hint_spares_named_sinks_only() {
        let keychain = Keychain::new();
        keychain.register("s3cr3t", SecretKind::Password);
        let (stderr, stderr_out) = capture(SinkName::Stderr);
        let (disk, disk_out) = capture(SinkName::Disk);
        let logger = Logger::new(keychain, vec![stderr, disk]);

        logger.log(
            LogEnvelope::new(
                LogLevel::Info,
                LogId::CONNECT_ATTEMPT,
                "connection",
                "s3cr3t",
            )
            .with_redaction(RedactionHint::Skip(vec![SinkName::Disk])),
        );

        assert_eq!(stderr_out.lock().unwrap()[0], "<password>");
        assert_eq!(disk_out.lock().unwrap()[0], "s3cr3t");
    }

    #[test]
    fn never_hint_skips_redaction_on_all_sinks() {
        let keychain = Keychain::new();
        keychain.register("s3cr3t", SecretKind::Password);
        let (stderr, stderr_out) = capture(SinkName::Stderr);
        let logger = Logger::new(keychain, vec![stderr]);

        logger.log(
            LogEnvelope::new(LogLevel::Info, LogId::CONNECT_ATTEMPT, "connection", "s3cr3t")
                .with_redaction(RedactionHint::Never),
        );

        assert_eq!(stderr_out.lock().unwrap()[0], "s3cr3t");
    }
}
