//! DDL tools: collection/index creation, drops, renames.

use async_trait::async_trait;
use bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use crate::ejson::document_from_value;
use crate::tools::{parse_args, text_result, OperationType, Tool, ToolCategory, ToolContext};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceArgs {
    database: String,
    collection: String,
}

fn namespace_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "database": { "type": "string", "description": "Database name" },
            "collection": { "type": "string", "description": "Collection name" },
        },
        "required": ["database", "collection"],
    })
}

pub struct CreateCollectionTool;

#[async_trait]
impl Tool for CreateCollectionTool {
    fn name(&self) -> &'static str {
        "create-collection"
    }

    fn description(&self) -> &'static str {
        "Create a collection in a MongoDB database"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Create
    }

    fn input_schema(&self) -> Value {
        namespace_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: NamespaceArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        client
            .database(&args.database)
            .create_collection(&args.collection)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;
        Ok(text_result(vec![format!(
            "Created collection \"{}\" in database \"{}\"",
            args.collection, args.database
        )]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexArgs {
    database: String,
    collection: String,
    keys: Value,
    #[serde(default)]
    name: Option<String>,
}

pub struct CreateIndexTool;

#[async_trait]
impl Tool for CreateIndexTool {
    fn name(&self) -> &'static str {
        "create-index"
    }

    fn description(&self) -> &'static str {
        "Create an index for a MongoDB collection"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Create
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "database": { "type": "string", "description": "Database name" },
                "collection": { "type": "string", "description": "Collection name" },
                "keys": {
                    "type": "object",
                    "description": "Index specification, e.g. { \"field\": 1 }",
                },
                "name": { "type": "string", "description": "Optional index name" },
            },
            "required": ["database", "collection", "keys"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: CreateIndexArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let keys = document_from_value(args.keys)?;

        let options = args
            .name
            .map(|name| IndexOptions::builder().name(name).build());
        let model = IndexModel::builder().keys(keys).options(options).build();
        let result = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .create_index(model)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        Ok(text_result(vec![format!(
            "Created index \"{}\" on collection \"{}\"",
            result.index_name, args.collection
        )]))
    }
}

pub struct DropCollectionTool;

#[async_trait]
impl Tool for DropCollectionTool {
    fn name(&self) -> &'static str {
        "drop-collection"
    }

    fn description(&self) -> &'static str {
        "Drop a collection, removing all of its documents and indexes"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Delete
    }

    fn input_schema(&self) -> Value {
        namespace_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: NamespaceArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .drop()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;
        Ok(text_result(vec![format!(
            "Dropped collection \"{}\" from database \"{}\"",
            args.collection, args.database
        )]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DropDatabaseArgs {
    database: String,
}

pub struct DropDatabaseTool;

#[async_trait]
impl Tool for DropDatabaseTool {
    fn name(&self) -> &'static str {
        "drop-database"
    }

    fn description(&self) -> &'static str {
        "Drop a database, removing all of its collections"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Delete
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "database": { "type": "string", "description": "Database name" },
            },
            "required": ["database"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: DropDatabaseArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        client
            .database(&args.database)
            .drop()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;
        Ok(text_result(vec![format!(
            "Dropped database \"{}\"",
            args.database
        )]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameCollectionArgs {
    database: String,
    collection: String,
    new_name: String,
    #[serde(default)]
    drop_target: bool,
}

pub struct RenameCollectionTool;

#[async_trait]
impl Tool for RenameCollectionTool {
    fn name(&self) -> &'static str {
        "rename-collection"
    }

    fn description(&self) -> &'static str {
        "Rename a collection within its database"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Update
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "database": { "type": "string", "description": "Database name" },
                "collection": { "type": "string", "description": "Current collection name" },
                "newName": { "type": "string", "description": "New collection name" },
                "dropTarget": {
                    "type": "boolean",
                    "description": "Drop an existing collection with the new name",
                },
            },
            "required": ["database", "collection", "newName"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: RenameCollectionArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        client
            .database("admin")
            .run_command(doc! {
                "renameCollection": format!("{}.{}", args.database, args.collection),
                "to": format!("{}.{}", args.database, args.new_name),
                "dropTarget": args.drop_target,
            })
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;
        Ok(text_result(vec![format!(
            "Renamed collection \"{}\" to \"{}\" in database \"{}\"",
            args.collection, args.new_name, args.database
        )]))
    }
}
