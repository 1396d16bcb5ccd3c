//! Tool registry policy and discovery invariants.

use mdbmcp_core::config::UserConfig;
use mdbmcp_core::Logger;
use mdbmcp_server::tools::{OperationType, ToolRegistry};
use pretty_assertions::assert_eq;

fn registry(config: &UserConfig) -> ToolRegistry {
    ToolRegistry::with_default_tools(config, &Logger::disabled(), false)
}

fn registry_with_atlas(config: &UserConfig) -> ToolRegistry {
    ToolRegistry::with_default_tools(config, &Logger::disabled(), true)
}

#[test]
fn fresh_stdio_server_lists_exactly_twenty_tools_sorted() {
    let tools = registry(&UserConfig::default()).list_mcp_tools();
    assert_eq!(tools.len(), 20);

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted, "tools must list in name order");

    assert_eq!(names[0], "aggregate");
    assert_eq!(
        tools[0].description.as_deref(),
        Some("Run an aggregation against a MongoDB collection")
    );
}

#[test]
fn atlas_credentials_add_the_atlas_family() {
    let without = registry(&UserConfig::default());
    let with = registry_with_atlas(&UserConfig::default());
    assert!(with.len() > without.len());
    assert!(with.contains("atlas-connect-cluster"));
    assert!(!without.contains("atlas-connect-cluster"));
}

#[test]
fn read_only_hides_create_update_delete_tools() {
    let config = UserConfig {
        read_only: true,
        ..UserConfig::default()
    };
    let registry = registry_with_atlas(&config);
    for tool in registry.list_mcp_tools() {
        let registered = registry.get(tool.name.as_ref()).unwrap();
        assert!(
            !registered.operation_type().is_write(),
            "{} must not be discoverable in read-only mode",
            tool.name
        );
    }
    // Connect tools survive read-only mode.
    assert!(registry.contains("connect"));
    assert!(registry.contains("atlas-connect-cluster"));
}

#[test]
fn annotations_are_a_pure_function_of_operation_type() {
    let registry = registry_with_atlas(&UserConfig::default());
    for tool in registry.list_mcp_tools() {
        let registered = registry.get(tool.name.as_ref()).unwrap();
        let op = registered.operation_type();
        let annotations = tool
            .annotations
            .as_ref()
            .unwrap_or_else(|| panic!("{} lacks annotations", tool.name));

        let read_only = matches!(
            op,
            OperationType::Read | OperationType::Metadata | OperationType::Connect
        );
        assert_eq!(annotations.read_only_hint, Some(read_only), "{}", tool.name);
        assert_eq!(
            annotations.destructive_hint,
            Some(op == OperationType::Delete),
            "{}",
            tool.name
        );
    }
}

#[test]
fn disabled_tools_are_not_discoverable() {
    let config = UserConfig {
        disabled_tools: vec!["export".to_string(), "atlas".to_string()],
        ..UserConfig::default()
    };
    let registry = registry_with_atlas(&config);
    assert!(!registry.contains("export"));
    for tool in registry.list_mcp_tools() {
        assert!(
            !tool.name.starts_with("atlas-"),
            "atlas category must be disabled"
        );
    }
}
