//! The `export` tool: asynchronous cursor→file export published as an
//! MCP resource.

use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::Document;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use crate::ejson::{optional_document, JsonExportFormat};
use crate::exports::CreateJsonExport;
use crate::tools::{parse_args, text_result, OperationType, Tool, ToolCategory, ToolContext};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportArgs {
    database: String,
    collection: String,
    #[serde(default)]
    filter: Option<Value>,
    #[serde(default)]
    projection: Option<Value>,
    #[serde(default)]
    sort: Option<Value>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    json_export_format: JsonExportFormat,
}

pub struct ExportTool;

#[async_trait]
impl Tool for ExportTool {
    fn name(&self) -> &'static str {
        "export"
    }

    fn description(&self) -> &'static str {
        "Export query results from a MongoDB collection to a JSON file resource"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Read
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "database": { "type": "string", "description": "Database name" },
                "collection": { "type": "string", "description": "Collection name" },
                "filter": { "type": "object", "description": "Query filter, in extended JSON" },
                "projection": { "type": "object", "description": "Fields to include or exclude" },
                "sort": { "type": "object", "description": "Sort specification" },
                "limit": { "type": "integer", "description": "Maximum number of documents to export" },
                "jsonExportFormat": {
                    "type": "string",
                    "enum": ["relaxed", "canonical"],
                    "description": "Extended JSON flavor for the exported documents",
                },
            },
            "required": ["database", "collection"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ExportArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let filter = optional_document(args.filter)?;

        let collection = client
            .database(&args.database)
            .collection::<Document>(&args.collection);
        let mut find = collection.find(filter);
        if let Some(limit) = args.limit {
            find = find.limit(limit);
        }
        if let Some(projection) = args.projection {
            find = find.projection(optional_document(Some(projection))?);
        }
        if let Some(sort) = args.sort {
            find = find.sort(optional_document(Some(sort))?);
        }
        let cursor = find
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let export_name = format!(
            "{}.{}.{}.json",
            args.database,
            args.collection,
            ObjectId::new().to_hex()
        );
        let export_title = format!(
            "Export of {}.{}",
            args.database, args.collection
        );
        let (export_uri, export_path) = ctx
            .session
            .exports()
            .create_json_export(CreateJsonExport {
                input: cursor,
                export_name,
                export_title,
                format: args.json_export_format,
            })
            .await?;

        Ok(text_result(vec![format!(
            "Export started. The documents are being written to {} and will be available \
             at the resource URI {} once the export finishes; a resource-updated \
             notification fires when it does.",
            export_path.display(),
            export_uri
        )]))
    }
}
