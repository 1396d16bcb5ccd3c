//! Extended JSON boundary helpers.
//!
//! Agents send BSON-typed values (`{"$oid": …}`, `{"$date": …}`) inside
//! plain JSON-RPC payloads; results go back the same way. All conversion
//! happens here so tool bodies work in `bson` types end to end.

use bson::{Bson, Document};
use serde_json::Value;

use mdbmcp_core::ErrorCode;

/// Output flavor for serialized documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonExportFormat {
    /// Human-readable, lossy (`{"$date"}` becomes an ISO string, small
    /// longs become plain numbers).
    #[default]
    Relaxed,
    /// Lossless (`{"$numberLong": "1234"}` and friends).
    Canonical,
}

/// Parse an extended-JSON value into a [`Document`].
///
/// Accepts anything `{"$oid": …}`-shaped the bson crate understands;
/// non-object input is rejected.
pub fn document_from_value(value: Value) -> Result<Document, ErrorCode> {
    match Bson::try_from(value) {
        Ok(Bson::Document(doc)) => Ok(doc),
        Ok(other) => Err(ErrorCode::InvalidToolArguments(format!(
            "expected a document, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(ErrorCode::InvalidToolArguments(format!(
            "invalid extended JSON: {e}"
        ))),
    }
}

/// Parse an optional extended-JSON document argument, defaulting to empty.
pub fn optional_document(value: Option<Value>) -> Result<Document, ErrorCode> {
    match value {
        Some(Value::Null) | None => Ok(Document::new()),
        Some(value) => document_from_value(value),
    }
}

/// Parse an array of extended-JSON documents (e.g. an aggregation
/// pipeline or the payload of `insert-many`).
pub fn documents_from_value(value: Value) -> Result<Vec<Document>, ErrorCode> {
    let Value::Array(items) = value else {
        return Err(ErrorCode::InvalidToolArguments(
            "expected an array of documents".to_string(),
        ));
    };
    items.into_iter().map(document_from_value).collect()
}

/// Serialize one document in the requested flavor.
pub fn document_to_value(doc: &Document, format: JsonExportFormat) -> Value {
    let bson = Bson::Document(doc.clone());
    match format {
        JsonExportFormat::Relaxed => bson.into_relaxed_extjson(),
        JsonExportFormat::Canonical => bson.into_canonical_extjson(),
    }
}

/// Serialize a batch of documents as a pretty-printed EJSON array string.
pub fn documents_to_string(docs: &[Document], format: JsonExportFormat) -> String {
    let values: Vec<Value> = docs.iter().map(|d| document_to_value(d, format)).collect();
    serde_json::to_string_pretty(&Value::Array(values))
        .unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;
    use serde_json::json;

    #[test]
    fn oid_round_trips_through_extended_json() {
        let oid = ObjectId::new();
        let value = json!({ "_id": { "$oid": oid.to_hex() } });
        let doc = document_from_value(value).unwrap();
        assert_eq!(doc.get_object_id("_id").unwrap(), oid);

        let back = document_to_value(&doc, JsonExportFormat::Canonical);
        assert_eq!(back["_id"]["$oid"], json!(oid.to_hex()));
    }

    #[test]
    fn date_filters_parse_to_bson_datetimes() {
        let value = json!({ "released": { "$gt": { "$date": "2025-05-10T00:00:00Z" } } });
        let doc = document_from_value(value).unwrap();
        let inner = doc.get_document("released").unwrap();
        assert!(matches!(inner.get("$gt"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn canonical_preserves_long_types() {
        let doc = bson::doc! { "longNumber": 1234_i64 };
        let value = document_to_value(&doc, JsonExportFormat::Canonical);
        assert_eq!(value, json!({ "longNumber": { "$numberLong": "1234" } }));
    }

    #[test]
    fn relaxed_emits_plain_numbers() {
        let doc = bson::doc! { "longNumber": 1234_i64 };
        let value = document_to_value(&doc, JsonExportFormat::Relaxed);
        assert_eq!(value, json!({ "longNumber": 1234 }));
    }

    #[test]
    fn non_document_input_is_rejected() {
        assert!(document_from_value(json!("plain string")).is_err());
        assert!(documents_from_value(json!({ "not": "array" })).is_err());
    }

    #[test]
    fn optional_document_defaults_to_empty() {
        assert_eq!(optional_document(None).unwrap(), Document::new());
        assert_eq!(
            optional_document(Some(serde_json::Value::Null)).unwrap(),
            Document::new()
        );
    }
}
