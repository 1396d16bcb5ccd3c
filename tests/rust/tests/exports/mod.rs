//! Export lifecycle: URIs, read outcomes, expiry sweeps.

use std::sync::Arc;

use mdbmcp_core::Logger;
use mdbmcp_server::exports::{ExportReadOutcome, ExportsManager};
use tests::test_config;

#[test]
fn resource_uris_round_trip_through_the_parser() {
    let name = "mflix.movies.665f1f77bcf86cd799439011.json";
    let uri = ExportsManager::resource_uri(name);
    assert_eq!(uri, format!("exported-data://{name}"));
    assert_eq!(ExportsManager::parse_resource_uri(&uri), Some(name));
    assert_eq!(ExportsManager::parse_resource_uri("exported-data://"), None);
    assert_eq!(ExportsManager::parse_resource_uri("file:///tmp/x"), None);
}

#[tokio::test]
async fn unknown_exports_read_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ExportsManager::new(Arc::new(test_config(&dir)), Logger::disabled());
    assert_eq!(
        manager.read_resource("never-created.json").await,
        ExportReadOutcome::NotFound
    );
    assert!(manager.list_resources().await.is_empty());
    manager.close().await;
}
