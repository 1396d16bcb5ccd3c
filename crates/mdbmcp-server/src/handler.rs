//! MCP protocol handler.
//!
//! Implements the rmcp `ServerHandler` over one [`Session`]: tool listing
//! and dispatch, export resources, and the post-initialization peer
//! wiring (log notifications, resource-updated notifications).

use std::sync::Arc;

use rmcp::model::*;
use rmcp::service::{NotificationContext, Peer, RequestContext};
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use tracing::{debug, warn};

use mdbmcp_core::{ExportEvent, SERVER_NAME, SERVER_VERSION};

use crate::exports::{ExportReadOutcome, ExportsManager};
use crate::logging::McpLogSinkHandle;
use crate::session::{McpClientInfo, Session};
use crate::telemetry::TelemetryService;
use crate::tools::{Dispatcher, ToolContext};

/// Per-session MCP handler.
#[derive(Clone)]
pub struct McpServerHandler {
    inner: Arc<HandlerInner>,
}

struct HandlerInner {
    session: Arc<Session>,
    dispatcher: Dispatcher,
    telemetry: Arc<TelemetryService>,
    mcp_sink: McpLogSinkHandle,
}

impl McpServerHandler {
    pub fn new(
        session: Arc<Session>,
        dispatcher: Dispatcher,
        telemetry: Arc<TelemetryService>,
        mcp_sink: McpLogSinkHandle,
    ) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                session,
                dispatcher,
                telemetry,
                mcp_sink,
            }),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// Forward export terminal transitions to the agent as
    /// resource-updated notifications. One notification per job.
    fn spawn_export_notifier(&self, peer: Peer<RoleServer>) {
        let mut events = self.inner.session.exports().subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let uri = event.resource_uri().to_string();
                if matches!(event, ExportEvent::Expired { .. }) {
                    // Expiry has no subscriber-visible resource anymore.
                    continue;
                }
                let params = ResourceUpdatedNotificationParam { uri: uri.clone() };
                if let Err(e) = peer.notify_resource_updated(params).await {
                    debug!(uri, "[Handler] Resource notification failed: {e}");
                    break;
                }
            }
        });
    }
}

impl ServerHandler for McpServerHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability {
                    list_changed: Some(false),
                })
                .enable_resources_with(ResourcesCapability {
                    subscribe: Some(false),
                    list_changed: Some(true),
                })
                .enable_logging()
                .build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                ..Default::default()
            },
            instructions: Some(
                "MongoDB MCP server. Use the connect tools to establish a connection, \
                 then query, inspect, and administer databases through the other tools."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        params: InitializeRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        let client = McpClientInfo {
            name: params.client_info.name.to_string(),
            version: params.client_info.version.to_string(),
            title: None,
        };
        debug!(client = %client.name, version = %client.version, "Client initializing");

        self.inner.telemetry.update_common(|common| {
            common.mcp_client_name = Some(client.name.clone());
            common.mcp_client_version = Some(client.version.clone());
            common.session_id = Some(self.inner.session.session_id.to_string());
        });
        self.inner.session.set_mcp_client(client);

        Ok(InitializeResult {
            protocol_version: params.protocol_version,
            capabilities: self.get_info().capabilities,
            server_info: self.get_info().server_info,
            instructions: self.get_info().instructions,
        })
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        // Bind the mcp log sink and the export notifier to this peer.
        self.inner.mcp_sink.bind(context.peer.clone());
        self.spawn_export_notifier(context.peer.clone());
        debug!(session_id = %self.inner.session.session_id, "Client initialized");
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self.inner.dispatcher.registry().list_mcp_tools();
        debug!(count = tools.len(), "list_tools");
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let args = Value::Object(params.arguments.unwrap_or_default());
        let ctx = ToolContext::new(self.inner.session.clone());
        self.inner
            .dispatcher
            .dispatch(&ctx, &context.peer, params.name.as_ref(), args)
            .await
    }

    async fn list_resources(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let jobs = self.inner.session.exports().list_resources().await;
        let resources: Vec<Resource> = jobs
            .iter()
            .filter_map(|job| {
                serde_json::from_value(serde_json::json!({
                    "uri": job.resource_uri,
                    "name": job.export_name,
                    "description": job.export_title,
                    "mimeType": "application/json",
                }))
                .ok()
            })
            .collect();
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        params: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = params.uri.to_string();
        let Some(export_name) = ExportsManager::parse_resource_uri(&uri) else {
            return Err(McpError::invalid_params(
                format!("Unknown resource URI: {uri}"),
                None,
            ));
        };

        match self.inner.session.exports().read_resource(export_name).await {
            ExportReadOutcome::Ready { content } => text_resource_result(&uri, "application/json", content),
            ExportReadOutcome::Pending => text_resource_result(
                &uri,
                "text/plain",
                format!("The export {uri} is still running; read the resource again shortly."),
            ),
            ExportReadOutcome::Failed { reason } => Err(McpError::internal_error(
                format!("Export failed: {reason}"),
                None,
            )),
            ExportReadOutcome::NotFound => Err(McpError::invalid_params(
                format!("Resource not found (the export may have expired): {uri}"),
                None,
            )),
        }
    }
}

fn text_resource_result(
    uri: &str,
    mime_type: &str,
    text: String,
) -> Result<ReadResourceResult, McpError> {
    serde_json::from_value(serde_json::json!({
        "contents": [{ "uri": uri, "mimeType": mime_type, "text": text }],
    }))
    .map_err(|e| {
        warn!("[Handler] Failed to build resource result: {e}");
        McpError::internal_error(format!("Failed to build resource result: {e}"), None)
    })
}
