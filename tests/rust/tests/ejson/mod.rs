//! Extended JSON round-trips at the BSON boundary.

use bson::oid::ObjectId;
use bson::{doc, Bson};
use mdbmcp_server::ejson::{
    document_from_value, document_to_value, documents_from_value, JsonExportFormat,
};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn oid_filter_matches_inserted_document_id() {
    // The agent inserts a document carrying `$oid` and later filters on
    // the same value; both ends must parse to the identical ObjectId.
    let oid = ObjectId::new();
    let inserted = document_from_value(json!({
        "_id": { "$oid": oid.to_hex() },
        "title": "The Matrix",
    }))
    .unwrap();
    let filter = document_from_value(json!({ "_id": { "$oid": oid.to_hex() } })).unwrap();

    assert_eq!(inserted.get_object_id("_id").unwrap(), oid);
    assert_eq!(
        inserted.get_object_id("_id").unwrap(),
        filter.get_object_id("_id").unwrap()
    );
}

#[test]
fn date_comparisons_order_correctly_after_parsing() {
    let released = document_from_value(json!({
        "released": { "$date": "2025-05-11T00:00:00Z" }
    }))
    .unwrap();
    let released = released.get_datetime("released").unwrap();

    let lower = document_from_value(json!({ "bound": { "$date": "2025-05-10T00:00:00Z" } }))
        .unwrap()
        .get_datetime("bound")
        .map(|d| *d)
        .unwrap();
    let upper = document_from_value(json!({ "bound": { "$date": "2025-05-12T00:00:00Z" } }))
        .unwrap()
        .get_datetime("bound")
        .map(|d| *d)
        .unwrap();

    // `$gt: 2025-05-10` matches, `$gt: 2025-05-12` does not.
    assert!(*released > lower);
    assert!(*released < upper);
}

#[test]
fn canonical_export_preserves_long_numbers() {
    let doc = doc! { "longNumber": 1234_i64 };
    let value = document_to_value(&doc, JsonExportFormat::Canonical);
    assert_eq!(value, json!({ "longNumber": { "$numberLong": "1234" } }));
}

#[test]
fn relaxed_export_is_readable() {
    let doc = doc! { "longNumber": 1234_i64, "name": "x" };
    let value = document_to_value(&doc, JsonExportFormat::Relaxed);
    assert_eq!(value, json!({ "longNumber": 1234, "name": "x" }));
}

#[test]
fn pipelines_parse_as_document_arrays() {
    let pipeline = documents_from_value(json!([
        { "$match": { "director": "Christina Collins" } },
        { "$limit": 5 },
    ]))
    .unwrap();
    assert_eq!(pipeline.len(), 2);
    assert!(matches!(
        pipeline[0].get("$match"),
        Some(Bson::Document(_))
    ));
}

#[test]
fn malformed_extended_json_is_rejected_not_coerced() {
    // `$oid` with a bad hex payload must fail loudly.
    assert!(document_from_value(json!({ "_id": { "$oid": "not-hex" } })).is_err());
}
