//! The `connect` tool: point the session at a MongoDB deployment.

use async_trait::async_trait;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::{ConnectionStateTag, ErrorCode};

use crate::connection::ConnectionSettings;
use crate::tools::{parse_args, text_result, OperationType, Tool, ToolCategory, ToolContext};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectArgs {
    #[serde(default)]
    connection_string: Option<String>,
}

pub struct ConnectTool;

#[async_trait]
impl Tool for ConnectTool {
    fn name(&self) -> &'static str {
        "connect"
    }

    fn description(&self) -> &'static str {
        "Connect to a MongoDB instance using a connection string"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Connect
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "connectionString": {
                    "type": "string",
                    "description": "MongoDB connection string (mongodb:// or mongodb+srv://). \
                                    Omit to use the server's configured connection string.",
                },
            },
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ConnectArgs = parse_args(args)?;
        let connection_string = args
            .connection_string
            .or_else(|| ctx.config().connection_string.clone())
            .ok_or_else(|| {
                ErrorCode::Operation(
                    "No connection string provided and none configured. Ask the user for \
                     their MongoDB connection string; do not invent one."
                        .to_string(),
                )
            })?;

        ctx.session
            .connect_to_mongodb(ConnectionSettings::new(connection_string))
            .await?;

        // The manager settles in `Connecting` for OIDC flows; re-read the
        // state to tell the outcomes apart.
        match ctx.session.connection_manager().state_tag().await {
            ConnectionStateTag::Connected => Ok(text_result(vec![
                "Successfully connected to MongoDB.".to_string(),
            ])),
            ConnectionStateTag::Connecting => {
                if let Some(prompt) = ctx.session.oidc_prompt().await {
                    return Err(ErrorCode::OidcInProgress {
                        login_url: prompt.login_url,
                        user_code: prompt.user_code,
                    });
                }
                Ok(text_result(vec![
                    "Connection is in progress (authentication pending). Retry a MongoDB \
                     tool in a few seconds."
                        .to_string(),
                ]))
            }
            other => Ok(text_result(vec![format!(
                "Connection attempt finished in state `{other:?}`."
            )])),
        }
    }
}
