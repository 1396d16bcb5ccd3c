//! Write tools: `insert-many`, `update-many`, `delete-many`.

use async_trait::async_trait;
use bson::Document;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use crate::ejson::{document_from_value, documents_from_value, optional_document};
use crate::tools::{
    ensure_uses_index, parse_args, text_result, OperationType, Tool, ToolCategory, ToolContext,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertManyArgs {
    database: String,
    collection: String,
    documents: Value,
}

pub struct InsertManyTool;

#[async_trait]
impl Tool for InsertManyTool {
    fn name(&self) -> &'static str {
        "insert-many"
    }

    fn description(&self) -> &'static str {
        "Insert an array of documents into a MongoDB collection"
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
                "documents": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "Documents to insert, in extended JSON",
                },
            },
            "required": ["database", "collection", "documents"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: InsertManyArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let documents = documents_from_value(args.documents)?;
        if documents.is_empty() {
            return Err(ErrorCode::InvalidToolArguments(
                "documents must not be empty".to_string(),
            ));
        }

        let result = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .insert_many(documents)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        Ok(text_result(vec![format!(
            "Inserted {} document(s) into collection \"{}\"",
            result.inserted_ids.len(),
            args.collection
        )]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateManyArgs {
    database: String,
    collection: String,
    #[serde(default)]
    filter: Option<Value>,
    update: Value,
    #[serde(default)]
    upsert: bool,
}

pub struct UpdateManyTool;

#[async_trait]
impl Tool for UpdateManyTool {
    fn name(&self) -> &'static str {
        "update-many"
    }

    fn description(&self) -> &'static str {
        "Update every document matching a filter in a MongoDB collection"
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
                "collection": { "type": "string", "description": "Collection name" },
                "filter": { "type": "object", "description": "Selects the documents to update" },
                "update": {
                    "type": "object",
                    "description": "Update document using operators such as $set",
                },
                "upsert": {
                    "type": "boolean",
                    "description": "Insert a document when nothing matches",
                },
            },
            "required": ["database", "collection", "update"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: UpdateManyArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let filter = optional_document(args.filter)?;
        let update = document_from_value(args.update)?;

        if ctx.config().index_check && !filter.is_empty() {
            ensure_uses_index(
                &client,
                &args.database,
                &args.collection,
                "update-many",
                &filter,
            )
            .await?;
        }

        let collection = client
            .database(&args.database)
            .collection::<Document>(&args.collection);
        let mut update_many = collection.update_many(filter, update);
        if args.upsert {
            update_many = update_many.upsert(true);
        }
        let result = update_many
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let mut message = format!(
            "Matched {} document(s), modified {} document(s) in collection \"{}\"",
            result.matched_count, result.modified_count, args.collection
        );
        if result.upserted_id.is_some() {
            message.push_str("; upserted 1 document");
        }
        Ok(text_result(vec![message]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteManyArgs {
    database: String,
    collection: String,
    #[serde(default)]
    filter: Option<Value>,
}

pub struct DeleteManyTool;

#[async_trait]
impl Tool for DeleteManyTool {
    fn name(&self) -> &'static str {
        "delete-many"
    }

    fn description(&self) -> &'static str {
        "Delete every document matching a filter from a MongoDB collection"
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
                "collection": { "type": "string", "description": "Collection name" },
                "filter": {
                    "type": "object",
                    "description": "Selects the documents to delete; an empty filter deletes all",
                },
            },
            "required": ["database", "collection"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: DeleteManyArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let filter = optional_document(args.filter)?;

        if ctx.config().index_check && !filter.is_empty() {
            ensure_uses_index(
                &client,
                &args.database,
                &args.collection,
                "delete-many",
                &filter,
            )
            .await?;
        }

        let result = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .delete_many(filter)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        Ok(text_result(vec![format!(
            "Deleted {} document(s) from collection \"{}\"",
            result.deleted_count, args.collection
        )]))
    }
}
