//! Read tools: `find`, `aggregate`, `count`.

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use crate::ejson::{documents_from_value, documents_to_string, optional_document, JsonExportFormat};
use crate::tools::{
    ensure_uses_index, parse_args, text_result, wrap_untrusted, OperationType, Tool, ToolCategory,
    ToolContext,
};

/// Default and maximum number of documents returned by `find`.
const DEFAULT_FIND_LIMIT: i64 = 10;
const MAX_DOCUMENTS: usize = 50_000;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindArgs {
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
}

pub struct FindTool;

#[async_trait]
impl Tool for FindTool {
    fn name(&self) -> &'static str {
        "find"
    }

    fn description(&self) -> &'static str {
        "Run a find query against a MongoDB collection"
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
                "limit": { "type": "integer", "description": "Maximum number of documents to return" },
            },
            "required": ["database", "collection"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: FindArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let filter = optional_document(args.filter)?;

        if ctx.config().index_check {
            ensure_uses_index(&client, &args.database, &args.collection, "find", &filter).await?;
        }

        let collection = client
            .database(&args.database)
            .collection::<Document>(&args.collection);
        let limit = args.limit.unwrap_or(DEFAULT_FIND_LIMIT);

        let mut find = collection.find(filter).limit(limit);
        if let Some(projection) = args.projection {
            find = find.projection(optional_document(Some(projection))?);
        }
        if let Some(sort) = args.sort {
            find = find.sort(optional_document(Some(sort))?);
        }

        let cursor = find
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;
        let documents: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let header = format!(
            "Found {} documents in the collection \"{}\":",
            documents.len(),
            args.collection
        );
        let payload = documents_to_string(&documents, JsonExportFormat::Relaxed);
        Ok(text_result(vec![header, wrap_untrusted(&payload)]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AggregateArgs {
    database: String,
    collection: String,
    pipeline: Value,
}

pub struct AggregateTool;

#[async_trait]
impl Tool for AggregateTool {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn description(&self) -> &'static str {
        "Run an aggregation against a MongoDB collection"
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
                "pipeline": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "Aggregation pipeline stages, in extended JSON",
                },
            },
            "required": ["database", "collection", "pipeline"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: AggregateArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let pipeline = documents_from_value(args.pipeline)?;

        let cursor = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let mut documents: Vec<Document> = Vec::new();
        let mut stream = cursor;
        while let Some(doc) = stream
            .try_next()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?
        {
            documents.push(doc);
            if documents.len() >= MAX_DOCUMENTS {
                break;
            }
        }

        let header = format!(
            "The aggregation on \"{}\" resulted in {} documents:",
            args.collection,
            documents.len()
        );
        let payload = documents_to_string(&documents, JsonExportFormat::Relaxed);
        Ok(text_result(vec![header, wrap_untrusted(&payload)]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountArgs {
    database: String,
    collection: String,
    #[serde(default)]
    query: Option<Value>,
}

pub struct CountTool;

#[async_trait]
impl Tool for CountTool {
    fn name(&self) -> &'static str {
        "count"
    }

    fn description(&self) -> &'static str {
        "Count documents in a MongoDB collection matching a query"
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
                "query": { "type": "object", "description": "Query filter, in extended JSON" },
            },
            "required": ["database", "collection"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: CountArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let filter = optional_document(args.query)?;

        if ctx.config().index_check && !filter.is_empty() {
            ensure_uses_index(&client, &args.database, &args.collection, "count", &filter).await?;
        }

        let count = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .count_documents(filter)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        Ok(text_result(vec![format!(
            "Found {count} documents in the collection \"{}\"",
            args.collection
        )]))
    }
}
