//! Metadata tools: database/collection inspection and query explain.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use rmcp::model::CallToolResult;
use serde::Deserialize;
use serde_json::{json, Value};

use mdbmcp_core::ErrorCode;

use crate::ejson::{
    document_to_value, documents_from_value, optional_document, JsonExportFormat,
};
use crate::tools::{
    parse_args, text_result, wrap_untrusted, OperationType, Tool, ToolCategory, ToolContext,
};

/// Sample size used for schema inference.
const SCHEMA_SAMPLE_SIZE: i64 = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseArgs {
    database: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceArgs {
    database: String,
    collection: String,
}

fn database_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "database": { "type": "string", "description": "Database name" },
        },
        "required": ["database"],
    })
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

pub struct ListDatabasesTool;

#[async_trait]
impl Tool for ListDatabasesTool {
    fn name(&self) -> &'static str {
        "list-databases"
    }

    fn description(&self) -> &'static str {
        "List all databases for a MongoDB connection"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, ctx: &ToolContext, _args: Value) -> Result<CallToolResult, ErrorCode> {
        let client = ctx.ensure_connected().await?;
        let databases = client
            .list_databases()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let listing = databases
            .iter()
            .map(|db| format!("{} ({} bytes on disk)", db.name, db.size_on_disk))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(text_result(vec![
            format!("Found {} databases:", databases.len()),
            wrap_untrusted(&listing),
        ]))
    }
}

pub struct ListCollectionsTool;

#[async_trait]
impl Tool for ListCollectionsTool {
    fn name(&self) -> &'static str {
        "list-collections"
    }

    fn description(&self) -> &'static str {
        "List all collections for a given database"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        database_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: DatabaseArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let names = client
            .database(&args.database)
            .list_collection_names()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        Ok(text_result(vec![
            format!(
                "Found {} collections in database \"{}\":",
                names.len(),
                args.database
            ),
            wrap_untrusted(&names.join("\n")),
        ]))
    }
}

pub struct CollectionIndexesTool;

#[async_trait]
impl Tool for CollectionIndexesTool {
    fn name(&self) -> &'static str {
        "collection-indexes"
    }

    fn description(&self) -> &'static str {
        "Describe the indexes for a collection"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        namespace_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: NamespaceArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let indexes: Vec<mongodb::IndexModel> = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .list_indexes()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let listing = indexes
            .iter()
            .map(|index| {
                let name = index
                    .options
                    .as_ref()
                    .and_then(|options| options.name.clone())
                    .unwrap_or_else(|| "<unnamed>".to_string());
                let keys = document_to_value(&index.keys, JsonExportFormat::Relaxed);
                format!("{name}: {keys}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(text_result(vec![
            format!(
                "Found {} indexes in the collection \"{}\":",
                indexes.len(),
                args.collection
            ),
            wrap_untrusted(&listing),
        ]))
    }
}

pub struct CollectionSchemaTool;

#[async_trait]
impl Tool for CollectionSchemaTool {
    fn name(&self) -> &'static str {
        "collection-schema"
    }

    fn description(&self) -> &'static str {
        "Infer the schema of a collection from a sample of its documents"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        namespace_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: NamespaceArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let documents: Vec<Document> = client
            .database(&args.database)
            .collection::<Document>(&args.collection)
            .find(Document::new())
            .limit(SCHEMA_SAMPLE_SIZE)
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?
            .try_collect()
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let schema = infer_schema(&documents);
        let payload = serde_json::to_string_pretty(&schema).unwrap_or_default();
        Ok(text_result(vec![
            format!(
                "Schema for \"{}\" inferred from {} sampled documents:",
                args.collection,
                documents.len()
            ),
            wrap_untrusted(&payload),
        ]))
    }
}

/// Field name → set of BSON type names seen in the sample. Nested
/// documents contribute dotted paths one level deep.
fn infer_schema(documents: &[Document]) -> BTreeMap<String, Vec<String>> {
    let mut fields: BTreeMap<String, BTreeSet<&'static str>> = BTreeMap::new();
    for doc in documents {
        for (key, value) in doc {
            fields.entry(key.clone()).or_default().insert(bson_type_name(value));
            if let Bson::Document(nested) = value {
                for (nested_key, nested_value) in nested {
                    fields
                        .entry(format!("{key}.{nested_key}"))
                        .or_default()
                        .insert(bson_type_name(nested_value));
                }
            }
        }
    }
    fields
        .into_iter()
        .map(|(key, types)| (key, types.into_iter().map(String::from).collect()))
        .collect()
}

fn bson_type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "object",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::DateTime(_) => "date",
        Bson::ObjectId(_) => "objectId",
        Bson::Decimal128(_) => "decimal",
        Bson::Binary(_) => "binData",
        Bson::RegularExpression(_) => "regex",
        _ => "other",
    }
}

pub struct CollectionStorageSizeTool;

#[async_trait]
impl Tool for CollectionStorageSizeTool {
    fn name(&self) -> &'static str {
        "collection-storage-size"
    }

    fn description(&self) -> &'static str {
        "Report the storage size of a collection"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        namespace_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: NamespaceArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let stats = client
            .database(&args.database)
            .run_command(doc! { "collStats": &args.collection, "scale": 1 })
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let size = stats.get_f64("size").or_else(|_| {
            stats.get_i64("size").map(|v| v as f64).or_else(|_| {
                stats.get_i32("size").map(|v| v as f64)
            })
        });
        let storage = stats.get_f64("storageSize").or_else(|_| {
            stats
                .get_i64("storageSize")
                .map(|v| v as f64)
                .or_else(|_| stats.get_i32("storageSize").map(|v| v as f64))
        });

        Ok(text_result(vec![format!(
            "Collection \"{}\": data size {} bytes, storage size {} bytes",
            args.collection,
            size.map(|v| v.to_string()).unwrap_or_else(|_| "unknown".to_string()),
            storage
                .map(|v| v.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
        )]))
    }
}

pub struct DbStatsTool;

#[async_trait]
impl Tool for DbStatsTool {
    fn name(&self) -> &'static str {
        "db-stats"
    }

    fn description(&self) -> &'static str {
        "Report storage statistics for a database"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        database_schema()
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: DatabaseArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;
        let stats = client
            .database(&args.database)
            .run_command(doc! { "dbStats": 1, "scale": 1 })
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let payload = serde_json::to_string_pretty(&document_to_value(
            &stats,
            JsonExportFormat::Relaxed,
        ))
        .unwrap_or_default();
        Ok(text_result(vec![
            format!("Statistics for database \"{}\":", args.database),
            wrap_untrusted(&payload),
        ]))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplainArgs {
    database: String,
    collection: String,
    /// One of `find`, `aggregate`, `count`.
    method: String,
    #[serde(default)]
    filter: Option<Value>,
    #[serde(default)]
    pipeline: Option<Value>,
}

pub struct ExplainTool;

#[async_trait]
impl Tool for ExplainTool {
    fn name(&self) -> &'static str {
        "explain"
    }

    fn description(&self) -> &'static str {
        "Explain the query plan for a find, aggregate, or count operation"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::MongoDb
    }

    fn operation_type(&self) -> OperationType {
        OperationType::Metadata
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "database": { "type": "string", "description": "Database name" },
                "collection": { "type": "string", "description": "Collection name" },
                "method": {
                    "type": "string",
                    "enum": ["find", "aggregate", "count"],
                    "description": "The operation to explain",
                },
                "filter": { "type": "object", "description": "Filter for find/count" },
                "pipeline": { "type": "array", "description": "Pipeline for aggregate" },
            },
            "required": ["database", "collection", "method"],
        })
    }

    async fn execute(&self, ctx: &ToolContext, args: Value) -> Result<CallToolResult, ErrorCode> {
        let args: ExplainArgs = parse_args(args)?;
        let client = ctx.ensure_connected().await?;

        let operation = match args.method.as_str() {
            "find" => {
                doc! { "find": &args.collection, "filter": optional_document(args.filter)? }
            }
            "count" => {
                doc! { "count": &args.collection, "query": optional_document(args.filter)? }
            }
            "aggregate" => {
                let pipeline = args
                    .pipeline
                    .map(documents_from_value)
                    .transpose()?
                    .unwrap_or_default();
                doc! {
                    "aggregate": &args.collection,
                    "pipeline": pipeline,
                    "cursor": {},
                }
            }
            other => {
                return Err(ErrorCode::InvalidToolArguments(format!(
                    "method must be one of find, aggregate, count; got `{other}`"
                )))
            }
        };

        let explain = client
            .database(&args.database)
            .run_command(doc! { "explain": operation, "verbosity": "queryPlanner" })
            .await
            .map_err(|e| ErrorCode::Operation(e.to_string()))?;

        let payload = serde_json::to_string_pretty(&document_to_value(
            &explain,
            JsonExportFormat::Relaxed,
        ))
        .unwrap_or_default();
        Ok(text_result(vec![
            format!(
                "Query plan for `{}` on \"{}\":",
                args.method, args.collection
            ),
            wrap_untrusted(&payload),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_inference_collects_types_per_field() {
        let documents = vec![
            doc! { "name": "one", "count": 1_i32, "meta": { "tag": "a" } },
            doc! { "name": "two", "count": 2_i64 },
            doc! { "name": Bson::Null },
        ];
        let schema = infer_schema(&documents);
        assert_eq!(schema["name"], vec!["null", "string"]);
        assert_eq!(schema["count"], vec!["int", "long"]);
        assert_eq!(schema["meta"], vec!["object"]);
        assert_eq!(schema["meta.tag"], vec!["string"]);
    }

    #[test]
    fn explain_rejects_unknown_method() {
        // Parsed at execute time; just pin the argument shape here.
        let args: ExplainArgs = serde_json::from_value(json!({
            "database": "db",
            "collection": "c",
            "method": "distinct"
        }))
        .unwrap();
        assert_eq!(args.method, "distinct");
    }
}
