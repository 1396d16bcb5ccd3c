//! Tool registration policy and the invocation pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rmcp::model::{
    CallToolResult, CreateElicitationRequestParams, ElicitationAction,
};
use rmcp::service::{Peer, RoleServer};
use rmcp::ErrorData as McpError;
use serde_json::Value;
use tracing::{debug, warn};

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::{ErrorCode, LogId, Logger, TelemetryEvent, TelemetryResult};

use super::{error_result, text_result, tool_json, Tool, ToolContext};
use crate::telemetry::TelemetryService;

/// Registered tools, keyed and listed in name order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tool` unless policy filters it out. Skipped tools are
    /// invisible to the agent; calling one yields method-not-found.
    pub fn register(&mut self, config: &UserConfig, logger: &Logger, tool: Arc<dyn Tool>) {
        if config.read_only && tool.operation_type().is_write() {
            logger.debug(
                LogId::TOOL_DISABLED,
                "registry",
                format!("Tool `{}` skipped: read-only mode", tool.name()),
            );
            return;
        }
        let disabled = &config.disabled_tools;
        if disabled.iter().any(|entry| {
            entry == tool.name()
                || entry == tool.category().as_str()
                || entry == tool.operation_type().as_str()
        }) {
            logger.debug(
                LogId::TOOL_DISABLED,
                "registry",
                format!("Tool `{}` skipped: disabled by configuration", tool.name()),
            );
            return;
        }
        self.tools.insert(tool.name(), tool);
    }

    /// The full tool set: MongoDB tools always, Atlas tools only when the
    /// API client is configured.
    pub fn with_default_tools(config: &UserConfig, logger: &Logger, include_atlas: bool) -> Self {
        let mut registry = Self::new();
        for tool in super::mongodb::all() {
            registry.register(config, logger, tool);
        }
        if include_atlas {
            for tool in super::atlas::all() {
                registry.register(config, logger, tool);
            }
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// MCP tool descriptors in name order.
    pub fn list_mcp_tools(&self) -> Vec<rmcp::model::Tool> {
        self.tools
            .values()
            .filter_map(|tool| serde_json::from_value(tool_json(tool.as_ref())).ok())
            .collect()
    }
}

/// Runs the per-invocation pipeline around tool bodies.
pub struct Dispatcher {
    registry: ToolRegistry,
    telemetry: Arc<TelemetryService>,
    logger: Logger,
}

impl Dispatcher {
    pub fn new(registry: ToolRegistry, telemetry: Arc<TelemetryService>, logger: Logger) -> Self {
        Self {
            registry,
            telemetry,
            logger,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Full pipeline: lookup, confirmation, execution, error mapping,
    /// telemetry. Exactly one telemetry event per invocation.
    pub async fn dispatch(
        &self,
        ctx: &ToolContext,
        peer: &Peer<RoleServer>,
        name: &str,
        args: Value,
    ) -> Result<CallToolResult, McpError> {
        let started = Instant::now();
        let Some(tool) = self.registry.get(name) else {
            return Err(McpError::new(
                rmcp::model::ErrorCode::METHOD_NOT_FOUND,
                format!("Unknown tool: {name}"),
                None,
            ));
        };
        let category = tool.category().as_str();

        self.logger.debug(
            LogId::TOOL_EXECUTE,
            "tool",
            format!("Executing `{name}`"),
        );

        if self.needs_confirmation(ctx, name) && supports_elicitation(peer) {
            if !self.elicit_confirmation(peer, name).await {
                let result = text_result(vec![format!(
                    "User did not confirm the execution of the `{name}` tool. \
                     The operation was not performed and no changes were made."
                )]);
                self.emit(name, category, started, TelemetryResult::Success);
                return Ok(result);
            }
        }

        match tool.execute(ctx, args).await {
            Ok(result) => {
                self.emit(name, category, started, TelemetryResult::Success);
                Ok(result)
            }
            Err(error) => {
                self.logger.warn(
                    LogId::TOOL_EXECUTE_FAILURE,
                    "tool",
                    format!("Tool `{name}` failed: {error}"),
                );
                let result = self.map_error(ctx, name, error).await;
                self.emit(name, category, started, TelemetryResult::Failure);
                Ok(result)
            }
        }
    }

    fn needs_confirmation(&self, ctx: &ToolContext, name: &str) -> bool {
        ctx.config()
            .confirmation_required_tools
            .iter()
            .any(|t| t == name)
    }

    /// Ask the user for confirmation. Declines, cancellations, and
    /// elicitation transport failures all mean "not confirmed".
    async fn elicit_confirmation(&self, peer: &Peer<RoleServer>, name: &str) -> bool {
        let params: CreateElicitationRequestParams =
            match serde_json::from_value(serde_json::json!({
                "message": confirmation_message(name),
                "requestedSchema": {
                    "type": "object",
                    "properties": {
                        "confirm": {
                            "type": "boolean",
                            "description": "Set to true to confirm the operation",
                        },
                    },
                    "required": ["confirm"],
                },
            })) {
                Ok(params) => params,
                Err(e) => {
                    warn!("[Dispatcher] Failed to build elicitation request: {e}");
                    return false;
                }
            };

        match peer.create_elicitation(params).await {
            Ok(result) => {
                if !matches!(result.action, ElicitationAction::Accept) {
                    return false;
                }
                serde_json::to_value(&result)
                    .ok()
                    .and_then(|v| v.get("content").cloned())
                    .and_then(|c| c.get("confirm").and_then(Value::as_bool))
                    .unwrap_or(false)
            }
            Err(e) => {
                warn!("[Dispatcher] Elicitation failed: {e}");
                false
            }
        }
    }

    /// §7 error mapping: connection errors become connect guidance, OIDC
    /// progress becomes a user prompt, everything else becomes tool error
    /// text.
    async fn map_error(&self, ctx: &ToolContext, name: &str, error: ErrorCode) -> CallToolResult {
        match error {
            ErrorCode::NotConnectedToMongoDB(_) | ErrorCode::MisconfiguredConnectionString(_) => {
                let lead = match &error {
                    ErrorCode::MisconfiguredConnectionString(reason) => format!(
                        "The configured connection string is not usable: {reason}"
                    ),
                    other => format!(
                        "You need to connect to a MongoDB instance before you can access its data. {other}."
                    ),
                };
                let mut connect_tools = Vec::new();
                if ctx.session.atlas_client().is_some()
                    && self.registry.contains("atlas-connect-cluster")
                {
                    connect_tools
                        .push("\"atlas-connect-cluster\" to connect to an Atlas cluster");
                }
                if self.registry.contains("connect") {
                    connect_tools.push("\"connect\" to connect to a MongoDB instance");
                }
                let guidance = format!(
                    "Please use one of the following tools: {}. Do not invent or guess a \
                     connection string; ask the user to provide one.",
                    connect_tools.join(", ")
                );
                error_result(vec![lead, guidance])
            }
            ErrorCode::OidcInProgress {
                login_url,
                user_code,
            } => {
                let url = login_url.unwrap_or_else(|| "the verification URL".to_string());
                let code = user_code.unwrap_or_else(|| "(no code)".to_string());
                text_result(vec![format!(
                    "Authentication is still in progress. Ask the user to open {url} and \
                     enter the code {code}, then retry this tool."
                )])
            }
            ErrorCode::ForbiddenCollscan(message) => error_result(vec![message]),
            other => error_result(vec![format!("Error running {name}: {other}")]),
        }
    }

    fn emit(&self, name: &str, category: &str, started: Instant, result: TelemetryResult) {
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!(tool = name, duration_ms, ?result, "[Dispatcher] Invocation finished");
        self.telemetry
            .emit(TelemetryEvent::tool_event(name, category, duration_ms, result));
    }
}

fn supports_elicitation(peer: &Peer<RoleServer>) -> bool {
    peer.peer_info()
        .map(|info| info.capabilities.elicitation.is_some())
        .unwrap_or(false)
}

/// Tool-specific confirmation templates; generic fallback otherwise.
fn confirmation_message(name: &str) -> String {
    match name {
        "drop-database" => "You are about to drop an entire database, permanently deleting all \
                            of its collections and documents. Confirm to proceed."
            .to_string(),
        "drop-collection" => "You are about to drop a collection, permanently deleting all of \
                              its documents and indexes. Confirm to proceed."
            .to_string(),
        "delete-many" => "You are about to delete every document matching the filter. This \
                          cannot be undone. Confirm to proceed."
            .to_string(),
        other => format!("You are about to execute the `{other}` tool. Confirm to proceed."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::OperationType;

    fn registry_for(config: &UserConfig) -> ToolRegistry {
        ToolRegistry::with_default_tools(config, &Logger::disabled(), false)
    }

    #[test]
    fn fresh_registry_exposes_exactly_twenty_mongodb_tools() {
        let registry = registry_for(&UserConfig::default());
        let tools = registry.list_mcp_tools();
        assert_eq!(tools.len(), 20);

        // Sorted by name; the first is aggregate with its exact description.
        let first = &tools[0];
        assert_eq!(first.name.as_ref(), "aggregate");
        assert_eq!(
            first.description.as_deref(),
            Some("Run an aggregation against a MongoDB collection")
        );
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }

    #[test]
    fn read_only_mode_hides_mutating_tools() {
        let config = UserConfig {
            read_only: true,
            ..UserConfig::default()
        };
        let registry = registry_for(&config);
        for name in [
            "insert-many",
            "update-many",
            "delete-many",
            "create-collection",
            "create-index",
            "drop-collection",
            "drop-database",
            "rename-collection",
        ] {
            assert!(!registry.contains(name), "{name} should be hidden");
        }
        // Reads, metadata, and connect stay.
        for name in ["find", "aggregate", "list-databases", "connect", "export"] {
            assert!(registry.contains(name), "{name} should stay");
        }
    }

    #[test]
    fn disabled_tools_match_name_category_and_operation_type() {
        let by_name = registry_for(&UserConfig {
            disabled_tools: vec!["find".to_string()],
            ..UserConfig::default()
        });
        assert!(!by_name.contains("find"));
        assert!(by_name.contains("aggregate"));

        let by_category = registry_for(&UserConfig {
            disabled_tools: vec!["mongodb".to_string()],
            ..UserConfig::default()
        });
        assert!(by_category.is_empty());

        let by_operation = registry_for(&UserConfig {
            disabled_tools: vec!["delete".to_string()],
            ..UserConfig::default()
        });
        assert!(!by_operation.contains("delete-many"));
        assert!(!by_operation.contains("drop-database"));
        assert!(by_operation.contains("find"));
    }

    #[test]
    fn annotations_follow_operation_type() {
        let registry = registry_for(&UserConfig::default());
        for tool in registry.list_mcp_tools() {
            let annotations = tool.annotations.as_ref().expect("annotations present");
            let registered = registry.get(tool.name.as_ref()).unwrap();
            let op = registered.operation_type();
            assert_eq!(annotations.read_only_hint, Some(op.read_only_hint()));
            assert_eq!(
                annotations.destructive_hint,
                Some(op == OperationType::Delete)
            );
        }
    }

    #[test]
    fn confirmation_messages_are_tool_specific_with_generic_fallback() {
        assert!(confirmation_message("drop-database").contains("entire database"));
        assert!(confirmation_message("find").contains("`find`"));
    }
}
