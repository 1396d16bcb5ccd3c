//! Atlas organization and project tools.

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use super::atlas_client;
use crate::tools::{
    parse_args, text_result, wrap_untrusted, OperationType, Tool, ToolCategory, ToolContext,
};

pub struct ListOrgsTool;

#[async_trait]
impl Tool for ListOrgsTool {
    fn name(&self) -> &'static str {
        "atlas-list-orgs"
    }

    fn description(&self) -> &'static str {
        "List Atlas organizations available to the configured service account"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<CallToolResult, ErrorCode> {
        let atlas = atlas_client(ctx)?;
        let orgs = atlas.list_orgs().await?;
        let listing = orgs
            .iter()
            .map(|org| format!("{} ({})", org.name, org.id))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text_result(vec![
            format!("Found {} organizations:", orgs.len()),
            wrap_untrusted(&listing),
        ]))
    }
}

pub struct ListProjectsTool;

#[async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &'static str {
        "atlas-list-projects"
    }

    fn description(&self) -> &'static str {
        "List Atlas projects available to the configured service account"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<CallToolResult, ErrorCode> {
        let atlas = atlas_client(ctx)?;
        let projects = atlas.list_projects().await?;
        let listing = projects
            .iter()
            .map(|p| format!("{} ({}, org {})", p.name, p.id, p.org_id))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text_result(vec![
            format!("Found {} projects:", projects.len()),
            wrap_untrusted(&listing),
        ]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProjectArgs {
    project_name: String,
    org_id: String,
}

pub struct CreateProjectTool;

#[async_trait]
impl Tool for CreateProjectTool {
    fn name(&self) -> &'static str {
        "atlas-create-project"
    }

    fn description(&self) -> &'static str {
        "Create a new Atlas project in an organization"
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
                "projectName": { "type": "string", "description": "Name for the new project" },
                "orgId": { "type": "string", "description": "Organization to create it in" },
            },
            "required": ["projectName", "orgId"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: CreateProjectArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;
        let project = atlas.create_project(&args.project_name, &args.org_id).await?;
        Ok(text_result(vec![format!(
            "Created project \"{}\" with id {}",
            project.name, project.id
        )]))
    }
}
