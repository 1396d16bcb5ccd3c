//! Tool surface: trait, annotations, and the registry/dispatcher.
//!
//! Tools are trait objects registered alongside their JSON schemas;
//! input validation is a pure function from raw JSON to a typed value
//! (each tool deserializes its own argument struct). Policy gating,
//! confirmation elicitation, error mapping, and telemetry live in the
//! dispatcher, not in tool bodies.

pub mod atlas;
mod context;
mod index_check;
pub mod mongodb;
mod registry;
mod untrusted;

pub use context::ToolContext;
pub use index_check::ensure_uses_index;
pub use registry::{Dispatcher, ToolRegistry};
pub use untrusted::wrap_untrusted;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content};
use serde_json::Value;

use mdbmcp_core::ErrorCode;

/// Which backend a tool talks to. Also a `disabled_tools` match key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    MongoDb,
    Atlas,
}

impl ToolCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolCategory::MongoDb => "mongodb",
            ToolCategory::Atlas => "atlas",
        }
    }
}

/// What a tool does to the data it touches. Drives annotations and the
/// read-only registration gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Read,
    Metadata,
    Create,
    Update,
    Delete,
    Connect,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Read => "read",
            OperationType::Metadata => "metadata",
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Connect => "connect",
        }
    }

    /// `readOnlyHint` is true iff the operation cannot mutate data.
    pub fn read_only_hint(self) -> bool {
        matches!(
            self,
            OperationType::Read | OperationType::Metadata | OperationType::Connect
        )
    }

    pub fn destructive_hint(self) -> bool {
        self == OperationType::Delete
    }

    /// Operations skipped entirely under `read_only`.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            OperationType::Create | OperationType::Update | OperationType::Delete
        )
    }
}

/// A server tool. Schemas are plain JSON values registered next to the
/// implementation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn category(&self) -> ToolCategory;
    fn operation_type(&self) -> OperationType;
    fn input_schema(&self) -> Value;

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode>;
}

/// The MCP-visible description of a tool, annotations derived purely
/// from its operation type.
pub fn tool_json(tool: &dyn Tool) -> Value {
    serde_json::json!({
        "name": tool.name(),
        "description": tool.description(),
        "inputSchema": tool.input_schema(),
        "annotations": {
            "title": tool.name(),
            "readOnlyHint": tool.operation_type().read_only_hint(),
            "destructiveHint": tool.operation_type().destructive_hint(),
        },
    })
}

/// Plain-text success result.
pub fn text_result(parts: Vec<String>) -> CallToolResult {
    CallToolResult::success(parts.into_iter().map(Content::text).collect())
}

/// Plain-text error result (`isError: true`).
pub fn error_result(parts: Vec<String>) -> CallToolResult {
    CallToolResult::error(parts.into_iter().map(Content::text).collect())
}

/// Deserialize a tool's typed arguments, mapping failures to the
/// invalid-arguments error.
pub fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T, ErrorCode> {
    serde_json::from_value(args).map_err(|e| ErrorCode::InvalidToolArguments(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_like_operations_are_read_only_and_not_destructive() {
        for op in [
            OperationType::Read,
            OperationType::Metadata,
            OperationType::Connect,
        ] {
            assert!(op.read_only_hint());
            assert!(!op.destructive_hint());
        }
    }

    #[test]
    fn delete_is_destructive_and_not_read_only() {
        assert!(OperationType::Delete.destructive_hint());
        assert!(!OperationType::Delete.read_only_hint());
        assert!(OperationType::Delete.is_write());
    }

    #[test]
    fn connect_is_not_a_write() {
        assert!(!OperationType::Connect.is_write());
    }
}
