//! Atlas tool family: thin wrappers over the Atlas Administration API.
//!
//! Registered only when Atlas service-account credentials are configured.

mod access;
mod clusters;
mod projects;

pub use access::{
    CreateAccessListTool, CreateDbUserTool, InspectAccessListTool, ListDbUsersTool,
};
pub use clusters::{
    ConnectClusterTool, CreateFreeClusterTool, InspectClusterTool, ListClustersTool,
};
pub use projects::{CreateProjectTool, ListOrgsTool, ListProjectsTool};

use std::sync::Arc;

use mdbmcp_core::ErrorCode;

use super::{Tool, ToolContext};
use crate::atlas::AtlasApiClient;

/// Every Atlas tool.
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListOrgsTool),
        Arc::new(ListProjectsTool),
        Arc::new(CreateProjectTool),
        Arc::new(ListClustersTool),
        Arc::new(InspectClusterTool),
        Arc::new(CreateFreeClusterTool),
        Arc::new(ConnectClusterTool),
        Arc::new(InspectAccessListTool),
        Arc::new(CreateAccessListTool),
        Arc::new(ListDbUsersTool),
        Arc::new(CreateDbUserTool),
    ]
}

/// The session's Atlas API client; registration implies it exists, but
/// tool bodies stay defensive.
pub(crate) fn atlas_client(ctx: &ToolContext) -> Result<Arc<AtlasApiClient>, ErrorCode> {
    ctx.session.atlas_client().cloned().ok_or_else(|| {
        ErrorCode::Operation(
            "Atlas API credentials are not configured; set apiClientId and apiClientSecret"
                .to_string(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolCategory;

    #[test]
    fn every_tool_is_atlas_category_and_prefixed() {
        for tool in all() {
            assert_eq!(tool.category(), ToolCategory::Atlas);
            assert!(tool.name().starts_with("atlas-"), "{}", tool.name());
        }
    }

    #[test]
    fn connect_cluster_is_a_connect_operation() {
        let tool = ConnectClusterTool;
        assert_eq!(
            tool.operation_type(),
            crate::tools::OperationType::Connect
        );
    }
}
