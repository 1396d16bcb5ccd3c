//! Event families broadcast over the [`crate::event_bus::EventBus`].

use serde::{Deserialize, Serialize};

/// Discriminant of the connection state machine, without the driver handle.
///
/// Events carry tags rather than full states so that observers never see a
/// driver handle outside the `connected` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStateTag {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

/// Events emitted by the connection manager on every state change, in
/// state-transition order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connect was requested; carries the pre-transition state.
    Requested { previous: ConnectionStateTag },
    /// The `hello` handshake succeeded and the state is now `connected`.
    Succeeded,
    /// The connect attempt hit the driver's server-selection timeout.
    TimedOut { reason: String },
    /// The driver handle was closed and the state is now `disconnected`.
    Closed,
    /// The connect attempt failed; the state is now `errored`.
    Errored { reason: String },
}

/// Session-level re-emission of connection events, consumed by transports.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    ConnectionError { reason: String },
}

/// Terminal export-job transitions; each job emits exactly one.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Ready { resource_uri: String, bytes_written: u64 },
    Failed { resource_uri: String, reason: String },
    Expired { resource_uri: String },
}

impl ExportEvent {
    pub fn resource_uri(&self) -> &str {
        match self {
            ExportEvent::Ready { resource_uri, .. }
            | ExportEvent::Failed { resource_uri, .. }
            | ExportEvent::Expired { resource_uri } => resource_uri,
        }
    }
}
