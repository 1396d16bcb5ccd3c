//! Index-usage gate for filter-taking tools.
//!
//! When `index_check` is enabled, read/update/delete tools run an
//! `explain` of the equivalent `find` before executing and refuse to
//! proceed when the winning plan is a full collection scan.

use bson::{doc, Bson, Document};
use mongodb::Client;

use mdbmcp_core::ErrorCode;

/// Verify the winning query plan for `filter` is not a `COLLSCAN`.
pub async fn ensure_uses_index(
    client: &Client,
    database: &str,
    collection: &str,
    operation: &str,
    filter: &Document,
) -> Result<(), ErrorCode> {
    let explain = doc! {
        "explain": { "find": collection, "filter": filter.clone() },
        "verbosity": "queryPlanner",
    };
    let plan = client
        .database(database)
        .run_command(explain)
        .await
        .map_err(|e| ErrorCode::Operation(format!("Failed to explain `{operation}`: {e}")))?;

    if winning_plan_has_collscan(&plan) {
        return Err(ErrorCode::ForbiddenCollscan(format!(
            "The `{operation}` on `{database}.{collection}` would run a full collection scan \
             (COLLSCAN) because no index covers the filter. Create a supporting index with the \
             `create-index` tool, narrow the filter to indexed fields, or disable the \
             `indexCheck` option."
        )));
    }
    Ok(())
}

/// Walk the explain output looking for a COLLSCAN stage anywhere in the
/// winning plan (plans nest via `inputStage`/`inputStages`, and sharded
/// explains nest whole plans under `shards`).
fn winning_plan_has_collscan(explain: &Document) -> bool {
    let Some(query_planner) = explain.get_document("queryPlanner").ok() else {
        return false;
    };
    if let Ok(winning) = query_planner.get_document("winningPlan") {
        if stage_has_collscan(winning) {
            return true;
        }
    }
    // Sharded form: queryPlanner.winningPlan.shards[].winningPlan
    if let Ok(winning) = query_planner.get_document("winningPlan") {
        if let Ok(shards) = winning.get_array("shards") {
            for shard in shards {
                if let Bson::Document(shard) = shard {
                    if let Ok(plan) = shard.get_document("winningPlan") {
                        if stage_has_collscan(plan) {
                            return true;
                        }
                    }
                }
            }
        }
    }
    false
}

fn stage_has_collscan(plan: &Document) -> bool {
    if plan.get_str("stage") == Ok("COLLSCAN") {
        return true;
    }
    if let Ok(input) = plan.get_document("inputStage") {
        if stage_has_collscan(input) {
            return true;
        }
    }
    if let Ok(inputs) = plan.get_array("inputStages") {
        for input in inputs {
            if let Bson::Document(input) = input {
                if stage_has_collscan(input) {
                    return true;
                }
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_collscan_is_detected() {
        let explain = doc! {
            "queryPlanner": { "winningPlan": { "stage": "COLLSCAN" } }
        };
        assert!(winning_plan_has_collscan(&explain));
    }

    #[test]
    fn nested_collscan_under_fetch_is_detected() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "LIMIT",
                    "inputStage": { "stage": "FETCH", "inputStage": { "stage": "COLLSCAN" } }
                }
            }
        };
        assert!(winning_plan_has_collscan(&explain));
    }

    #[test]
    fn index_scan_passes() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "FETCH",
                    "inputStage": { "stage": "IXSCAN", "indexName": "director_1" }
                }
            }
        };
        assert!(!winning_plan_has_collscan(&explain));
    }

    #[test]
    fn sharded_collscan_is_detected() {
        let explain = doc! {
            "queryPlanner": {
                "winningPlan": {
                    "stage": "SHARD_MERGE",
                    "shards": [
                        { "winningPlan": { "stage": "IXSCAN" } },
                        { "winningPlan": { "stage": "COLLSCAN" } },
                    ]
                }
            }
        };
        assert!(winning_plan_has_collscan(&explain));
    }

    #[test]
    fn malformed_explain_output_passes_open() {
        assert!(!winning_plan_has_collscan(&doc! { "ok": 1 }));
    }
}
