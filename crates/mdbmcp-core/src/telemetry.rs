//! Telemetry event model.
//!
//! Events are assembled by the dispatcher and buffered by the server
//! crate's telemetry service. No PII beyond the declared common
//! properties is ever attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed event source identifier.
pub const TELEMETRY_SOURCE: &str = "mdbmcp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetryResult {
    Success,
    Failure,
}

/// Properties shared by every event from this process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonProperties {
    pub device_id: Option<String>,
    pub mcp_server_version: String,
    pub mcp_server_name: String,
    pub mcp_client_name: Option<String>,
    pub mcp_client_version: Option<String>,
    pub session_id: Option<String>,
    pub transport: Option<String>,
    pub config_read_only: Option<bool>,
    pub config_index_check: Option<bool>,
}

/// One telemetry event. Only ever serialized (toward the ingestion
/// endpoint), never parsed back.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub timestamp: DateTime<Utc>,
    pub source: &'static str,
    pub properties: Map<String, Value>,
}

impl TelemetryEvent {
    /// A tool-invocation event, the only event category the dispatcher
    /// emits per call.
    pub fn tool_event(
        command: &str,
        category: &str,
        duration_ms: u64,
        result: TelemetryResult,
    ) -> Self {
        let mut properties = Map::new();
        properties.insert("component".into(), Value::from("tool"));
        properties.insert("command".into(), Value::from(command));
        properties.insert("category".into(), Value::from(category));
        properties.insert("duration_ms".into(), Value::from(duration_ms));
        properties.insert(
            "result".into(),
            Value::from(match result {
                TelemetryResult::Success => "success",
                TelemetryResult::Failure => "failure",
            }),
        );
        Self {
            timestamp: Utc::now(),
            source: TELEMETRY_SOURCE,
            properties,
        }
    }

    /// A server lifecycle event (startup/shutdown).
    pub fn server_event(command: &str, duration_ms: u64) -> Self {
        let mut properties = Map::new();
        properties.insert("component".into(), Value::from("server"));
        properties.insert("command".into(), Value::from(command));
        properties.insert("duration_ms".into(), Value::from(duration_ms));
        properties.insert("result".into(), Value::from("success"));
        Self {
            timestamp: Utc::now(),
            source: TELEMETRY_SOURCE,
            properties,
        }
    }

    /// Attach the resolved common properties before flushing.
    pub fn with_common(mut self, common: &CommonProperties) -> Self {
        if let Ok(Value::Object(map)) = serde_json::to_value(common).map(normalize_nulls) {
            for (key, value) in map {
                self.properties.entry(key).or_insert(value);
            }
        }
        self
    }

    pub fn extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

fn normalize_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_event_carries_required_properties() {
        let event = TelemetryEvent::tool_event("find", "mongodb", 42, TelemetryResult::Failure);
        assert_eq!(event.source, "mdbmcp");
        assert_eq!(event.properties["command"], "find");
        assert_eq!(event.properties["category"], "mongodb");
        assert_eq!(event.properties["duration_ms"], 42);
        assert_eq!(event.properties["result"], "failure");
    }

    #[test]
    fn common_properties_do_not_override_event_properties() {
        let common = CommonProperties {
            device_id: Some("device".into()),
            mcp_server_version: "0.3.0".into(),
            mcp_server_name: "mongodb-mcp-server".into(),
            ..CommonProperties::default()
        };
        let event = TelemetryEvent::tool_event("find", "mongodb", 1, TelemetryResult::Success)
            .with_common(&common);
        assert_eq!(event.properties["device_id"], "device");
        assert_eq!(event.properties["command"], "find");
        // Null optionals are dropped rather than serialized.
        assert!(!event.properties.contains_key("session_id"));
    }
}
