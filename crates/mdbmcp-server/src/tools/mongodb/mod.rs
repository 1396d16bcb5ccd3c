//! MongoDB tool family: thin wrappers over the driver behind the shared
//! dispatch contract.

mod connect;
mod ddl;
mod export;
mod metadata;
mod read;
mod write;

pub use connect::ConnectTool;
pub use ddl::{
    CreateCollectionTool, CreateIndexTool, DropCollectionTool, DropDatabaseTool,
    RenameCollectionTool,
};
pub use export::ExportTool;
pub use metadata::{
    CollectionIndexesTool, CollectionSchemaTool, CollectionStorageSizeTool, DbStatsTool,
    ExplainTool, ListCollectionsTool, ListDatabasesTool,
};
pub use read::{AggregateTool, CountTool, FindTool};
pub use write::{DeleteManyTool, InsertManyTool, UpdateManyTool};

use std::sync::Arc;

use super::Tool;

/// Every MongoDB tool, in no particular order; the registry sorts.
pub fn all() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(AggregateTool),
        Arc::new(CollectionIndexesTool),
        Arc::new(CollectionSchemaTool),
        Arc::new(CollectionStorageSizeTool),
        Arc::new(ConnectTool),
        Arc::new(CountTool),
        Arc::new(CreateCollectionTool),
        Arc::new(CreateIndexTool),
        Arc::new(DbStatsTool),
        Arc::new(DeleteManyTool),
        Arc::new(DropCollectionTool),
        Arc::new(DropDatabaseTool),
        Arc::new(ExplainTool),
        Arc::new(ExportTool),
        Arc::new(FindTool),
        Arc::new(InsertManyTool),
        Arc::new(ListCollectionsTool),
        Arc::new(ListDatabasesTool),
        Arc::new(RenameCollectionTool),
        Arc::new(UpdateManyTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_family_has_twenty_tools_with_unique_names() {
        let tools = all();
        assert_eq!(tools.len(), 20);
        let mut names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 20);
    }

    #[test]
    fn every_tool_is_in_the_mongodb_category() {
        for tool in all() {
            assert_eq!(tool.category(), crate::tools::ToolCategory::MongoDb);
        }
    }

    #[test]
    fn every_schema_is_an_object_schema() {
        for tool in all() {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "{}", tool.name());
        }
    }
}
