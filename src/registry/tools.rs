//! Fixed demonstration tool catalog.
//!
//! The actual structural-query algorithms (Cypher-equivalent traversals) are
//! out of scope; this module exists to give the dispatch pipeline something
//! real to register, validate against, and execute, matching the
//! `query_callers` example used throughout the end-to-end scenarios.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{RegistryBuilder, ToolContext, ToolHandler};
use crate::error::Result;

struct QueryCallers;

#[async_trait]
impl ToolHandler for QueryCallers {
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Result<Value> {
        let function_name = arguments
            .get("function_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let max_depth = arguments.get("max_depth").and_then(Value::as_u64).unwrap_or(1);

        let cypher = format!(
            "MATCH (caller)-[:CALLS*1..{max_depth}]->(callee {{name: $name}}) RETURN caller.name AS caller_name"
        );
        let callers = ctx
            .graph
            .query_string_column(&cypher, &[("name", function_name.to_string())], "caller_name")
            .await?;

        Ok(json!({
            "function_name": function_name,
            "callers": callers,
        }))
    }
}

struct ListDependencies;

#[async_trait]
impl ToolHandler for ListDependencies {
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Result<Value> {
        let module = arguments.get("module").and_then(Value::as_str).unwrap_or_default();
        let cypher = "MATCH (m {name: $name})-[:DEPENDS_ON]->(dep) RETURN dep.name AS dep_name";
        let dependencies = ctx
            .graph
            .query_string_column(cypher, &[("name", module.to_string())], "dep_name")
            .await?;

        Ok(json!({
            "module": module,
            "dependencies": dependencies,
        }))
    }
}

/// Register the built-in tool catalog onto `builder`.
///
/// # Errors
///
/// Returns an error if any registration fails (duplicate or malformed name);
/// this can only happen if this function itself is edited incorrectly, so a
/// failure here is treated as a startup abort per the lifecycle contract.
pub fn register_default_tools(builder: &mut RegistryBuilder) -> Result<()> {
    builder.register(
        "query_callers",
        "Find every function that calls the named function, up to a depth bound.",
        json!({
            "type": "object",
            "properties": {
                "function_name": {"type": "string"},
                "max_depth": {"type": "integer", "minimum": 1, "maximum": 10}
            },
            "required": ["function_name"],
            "additionalProperties": false
        }),
        Arc::new(QueryCallers),
    )?;

    builder.register(
        "list_dependencies",
        "List the direct dependencies of a named module.",
        json!({
            "type": "object",
            "properties": {
                "module": {"type": "string"}
            },
            "required": ["module"],
            "additionalProperties": false
        }),
        Arc::new(ListDependencies),
    )?;

    Ok(())
}
