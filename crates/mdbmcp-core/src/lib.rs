//! # mdbmcp-core
//!
//! Core building blocks of the MongoDB MCP server.
//!
//! ## Modules
//!
//! - `config` - user configuration, env parsing, validation
//! - `keychain` - process-wide secret registry for redaction
//! - `logging` - composite logger with per-sink redaction
//! - `error` - error taxonomy crossing the tool/dispatch boundary
//! - `event` / `event_bus` - typed event families and their broadcast bus
//! - `telemetry` - telemetry event model
//! - `device_id` - anonymous device identifier

pub mod config;
pub mod device_id;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod keychain;
pub mod logging;
pub mod telemetry;

pub use config::{TelemetryMode, TransportKind, UserConfig};
pub use error::ErrorCode;
pub use event::{ConnectionEvent, ConnectionStateTag, ExportEvent, SessionEvent};
pub use event_bus::{EventBus, EventReceiver};
pub use keychain::{Keychain, SecretKind};
pub use logging::{LogEnvelope, LogId, LogLevel, LogSink, Logger, RedactionHint, SinkName};
pub use telemetry::{CommonProperties, TelemetryEvent, TelemetryResult};

/// Server name advertised during MCP initialization and embedded in the
/// driver `appName`.
pub const SERVER_NAME: &str = "mongodb-mcp-server";

/// Server version from the workspace manifest.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
