//! Atlas access-list and database-user tools.

use async_trait::async_trait;
use chrono::Utc;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use super::atlas_client;
use crate::atlas::types::{AccessListEntry, DatabaseUser, DatabaseUserRole};
use crate::tools::{
    parse_args, text_result, wrap_untrusted, OperationType, Tool, ToolCategory, ToolContext,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectArgs {
    project_id: String,
}

fn project_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "projectId": { "type": "string", "description": "Atlas project id" },
        },
        "required": ["projectId"],
    })
}

pub struct InspectAccessListTool;

#[async_trait]
impl Tool for InspectAccessListTool {
    fn name(&self) -> &'static str {
        "atlas-inspect-access-list"
    }

    fn description(&self) -> &'static str {
        "List the IP access list entries of an Atlas project"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        project_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ProjectArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;
        let entries = atlas.list_access_list(&args.project_id).await?;
        let listing = entries
            .iter()
            .map(|entry| {
                let address = entry
                    .ip_address
                    .as_deref()
                    .or(entry.cidr_block.as_deref())
                    .unwrap_or("<unknown>");
                match &entry.comment {
                    Some(comment) => format!("{address} ({comment})"),
                    None => address.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text_result(vec![
            format!("Found {} access list entries:", entries.len()),
            wrap_untrusted(&listing),
        ]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateAccessListArgs {
    project_id: String,
    #[serde(default)]
    ip_address: Option<String>,
    #[serde(default)]
    cidr_block: Option<String>,
    #[serde(default)]
    comment: Option<String>,
}

pub struct CreateAccessListTool;

#[async_trait]
impl Tool for CreateAccessListTool {
    fn name(&self) -> &'static str {
        "atlas-create-access-list"
    }

    fn description(&self) -> &'static str {
        "Add an IP address or CIDR block to an Atlas project's access list"
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
                "ipAddress": { "type": "string", "description": "IP address to allow" },
                "cidrBlock": { "type": "string", "description": "CIDR block to allow" },
                "comment": { "type": "string", "description": "Optional entry comment" },
            },
            "required": ["projectId"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: CreateAccessListArgs = parse_args(args)?;
        if args.ip_address.is_none() && args.cidr_block.is_none() {
            return Err(ErrorCode::InvalidToolArguments(
                "one of ipAddress or cidrBlock is required".to_string(),
            ));
        }
        let atlas = atlas_client(ctx)?;
        let entry = AccessListEntry {
            ip_address: args.ip_address.clone(),
            cidr_block: args.cidr_block.clone(),
            comment: args.comment,
        };
        atlas
            .create_access_list_entries(&args.project_id, &[entry])
            .await?;
        Ok(text_result(vec![format!(
            "Added {} to the project access list",
            args.ip_address
                .or(args.cidr_block)
                .unwrap_or_default()
        )]))
    }
}

pub struct ListDbUsersTool;

#[async_trait]
impl Tool for ListDbUsersTool {
    fn name(&self) -> &'static str {
        "atlas-list-db-users"
    }

    fn description(&self) -> &'static str {
        "List database users of an Atlas project"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Atlas
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        project_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ProjectArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;
        let users = atlas.list_db_users(&args.project_id).await?;
        let listing = users
            .iter()
            .map(|user| {
                let roles = user
                    .roles
                    .iter()
                    .map(|role| format!("{}@{}", role.role_name, role.database_name))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} [{roles}]", user.username)
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text_result(vec![
            format!("Found {} database users:", users.len()),
            wrap_untrusted(&listing),
        ]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateDbUserArgs {
    project_id: String,
    username: String,
    password: String,
    /// Role names on the admin database, e.g. `readAnyDatabase`.
    #[serde(default = "default_roles")]
    roles: Vec<String>,
    /// Expire the user automatically after this many hours.
    #[serde(default)]
    expires_after_hours: Option<i64>,
}

fn default_roles() -> Vec<String> {
    vec!["readAnyDatabase".to_string()]
}

pub struct CreateDbUserTool;

#[async_trait]
impl Tool for CreateDbUserTool {
    fn name(&self) -> &'static str {
        "atlas-create-db-user"
    }

    fn description(&self) -> &'static str {
        "Create a database user in an Atlas project"
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
                "username": { "type": "string", "description": "Username for the new user" },
                "password": { "type": "string", "description": "Password for the new user" },
                "roles": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Admin-database role names, defaults to readAnyDatabase",
                },
                "expiresAfterHours": {
                    "type": "integer",
                    "description": "Delete the user automatically after this many hours",
                },
            },
            "required": ["projectId", "username", "password"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: CreateDbUserArgs = parse_args(args)?;
        let atlas = atlas_client(ctx)?;

        // The password is a fresh secret; make sure logs never leak it.
        ctx.session
            .keychain()
            .register(args.password.clone(), mdbmcp_core::SecretKind::Password);

        let user = DatabaseUser {
            username: args.username.clone(),
            password: Some(args.password),
            database_name: "admin".to_string(),
            roles: args
                .roles
                .iter()
                .map(|role| DatabaseUserRole {
                    role_name: role.clone(),
                    database_name: "admin".to_string(),
                })
                .collect(),
            scopes: Vec::new(),
            delete_after_date: args
                .expires_after_hours
                .map(|hours| Utc::now() + chrono::Duration::hours(hours)),
        };
        let created = atlas.create_db_user(&args.project_id, &user).await?;
        Ok(text_result(vec![format!(
            "Created database user \"{}\"",
            created.username
        )]))
    }
}
