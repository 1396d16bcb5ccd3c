//! Atlas cluster tools, including the multi-step connect flow.

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use super::atlas_client;
use crate::atlas::{query_connection, ClusterConnectFlow, ClusterConnectionState};
use crate::tools::{
    parse_args, text_result, wrap_untrusted, OperationType, Tool, ToolCategory, ToolContext,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArgs {
    project_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterArgs {
    project_id: String,
    cluster_name: String,
}

fn cluster_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "projectId": { "type": "string", "description": "Atlas project id" },
            "clusterName": { "type": "string", "description": "Cluster name" },
        },
        "required": ["projectId", "clusterName"],
    })
}

pub struct ListClustersTool;

#[async_trait]
impl Tool for ListClustersTool {
    fn name(&self) -> &'static str {
        "atlas-list-clusters"
    }

    fn description(&self) -> &'static str {
        "List clusters in an Atlas project"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "string", "description": "Atlas project id" },
            },
            "required": ["projectId"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ProjectArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;
        let clusters = atlas.list_clusters(&args.project_id).await?;
        let listing = clusters
            .iter()
            .map(|c| {
                format!(
                    "{} ({}, MongoDB {})",
                    c.name,
                    c.state_name.as_deref().unwrap_or("unknown state"),
                    c.mongo_db_version.as_deref().unwrap_or("?"),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text_result(vec![
            format!("Found {} clusters:", clusters.len()),
            wrap_untrusted(&listing),
        ]))
    }
}

pub struct InspectClusterTool;

#[async_trait]
impl Tool for InspectClusterTool {
    fn name(&self) -> &'static str {
        "atlas-inspect-cluster"
    }

    fn description(&self) -> &'static str {
        "Inspect a single Atlas cluster"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        cluster_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ClusterArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;
        let cluster = atlas
            .get_cluster(&args.project_id, &args.cluster_name)
            .await?;
        let details = format!(
            "name: {}\nstate: {}\nmongodb version: {}\npaused: {}\nconnection string: {}",
            cluster.name,
            cluster.state_name.as_deref().unwrap_or("unknown"),
            cluster.mongo_db_version.as_deref().unwrap_or("unknown"),
            cluster.paused.unwrap_or(false),
            cluster.connection_string().unwrap_or("not yet available"),
        );
        Ok(text_result(vec![
            format!("Cluster \"{}\":", cluster.name),
            wrap_untrusted(&details),
        ]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFreeClusterArgs {
    project_id: String,
    name: String,
    #[serde(default = "default_region")]
    region: String,
}

fn default_region() -> String {
    "US_EAST_1".to_string()
}

pub struct CreateFreeClusterTool;

#[async_trait]
impl Tool for CreateFreeClusterTool {
    fn name(&self) -> &'static str {
        "atlas-create-free-cluster"
    }

    fn description(&self) -> &'static str {
        "Create a free-tier Atlas cluster in a project"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Create
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectId": { "type": "string", "description": "Atlas project id" },
                "name": { "type": "string", "description": "Name for the new cluster" },
                "region": {
                    "type": "string",
                    "description": "Cloud region, defaults to US_EAST_1",
                },
            },
            "required": ["projectId", "name"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: CreateFreeClusterArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;
        let cluster = atlas
            .create_free_cluster(&args.project_id, &args.name, &args.region)
            .await?;
        Ok(text_result(vec![format!(
            "Creating free cluster \"{}\" (state: {}). Provisioning takes a few minutes; \
             use atlas-inspect-cluster to check progress.",
            cluster.name,
            cluster.state_name.as_deref().unwrap_or("CREATING"),
        )]))
    }
}

pub struct ConnectClusterTool;

#[async_trait]
impl Tool for ConnectClusterTool {
    fn name(&self) -> &'static str {
        "atlas-connect-cluster"
    }

    fn description(&self) -> &'static str {
        "Connect the session to an Atlas cluster, provisioning temporary credentials"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Connect
    }

    fn input_schema(&self) -> Value {
        cluster_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ClusterArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;

        // Repeat calls poll the in-flight attempt instead of provisioning
        // a second user for the same cluster.
        match query_connection(&ctx.session, &args.project_id, &args.cluster_name).await {
            ClusterConnectionState::Connected => {
                return Ok(text_result(vec![format!(
                    "Already connected to cluster \"{}\".",
                    args.cluster_name
                )]));
            }
            ClusterConnectionState::Connecting => {
                return Ok(text_result(vec![format!(
                    "Still connecting to cluster \"{}\". Call this tool again in a few \
                     seconds to check progress.",
                    args.cluster_name
                )]));
            }
            ClusterConnectionState::ConnectedToOtherCluster
            | ClusterConnectionState::Disconnected
            | ClusterConnectionState::Unknown => {}
        }

        ClusterConnectFlow::new(
            ctx.session.clone(),
            atlas,
            args.project_id,
            args.cluster_name.clone(),
        )
        .start()
        .await?;

        Ok(text_result(vec![format!(
            "Connecting to cluster \"{}\": temporary credentials were provisioned and the \
             connection attempt is running in the background. Call this tool again to \
             check the connection status.",
            args.cluster_name
        )]))
    }
}
