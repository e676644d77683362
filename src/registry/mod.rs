//! Tool Registry: the immutable, in-process catalog of `(name, description,
//! input_schema, handler)` records exposed by `GET /tools` and dispatched by
//! `POST /call-tool`.

pub mod schema;
pub mod tools;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::graph::GraphHandle;

/// Per-call context threaded to every handler invocation. Carries the
/// correlation id and the deadline the dispatcher has already committed to;
/// handlers are expected to honor cancellation rather than poll this
/// directly (the dispatcher wraps every call in `tokio::time::timeout`), but
/// a well-behaved long-running handler MAY check `remaining()` between steps.
#[derive(Clone)]
pub struct ToolContext {
    /// Correlation id threaded through logs and the response envelope.
    pub request_id: String,
    /// When this call's hard deadline expires.
    pub deadline: Instant,
    /// Handle to the graph-store dependency. Opaque to the dispatcher.
    pub graph: Arc<GraphHandle>,
}

impl ToolContext {
    /// Time remaining before the deadline fires. Zero if already expired.
    #[must_use]
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// The per-tool asynchronous function registered in the Tool Registry.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool against validated arguments. Returns a
    /// JSON-serializable value or a typed [`Error`].
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Result<Value>;
}

/// A discovery record: everything about a tool except its handler.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    /// Tool identifier, matches `^[a-z][a-z0-9_]*$`.
    pub name: String,
    /// Non-empty human-readable description.
    pub description: String,
    /// Draft-7 JSON-Schema fragment describing `arguments`.
    pub input_schema: Value,
}

struct ToolRecord {
    schema: ToolSchema,
    handler: Arc<dyn ToolHandler>,
}

fn tool_name_re() -> Regex {
    Regex::new(r"^[a-z][a-z0-9_]*$").unwrap()
}

/// The immutable tool catalog. Built once during startup via [`RegistryBuilder`].
pub struct Registry {
    tools: BTreeMap<String, ToolRecord>,
}

impl Registry {
    /// `List() → []ToolSchema`, sorted by name. Used by `GET /tools`.
    #[must_use]
    pub fn list(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|r| r.schema.clone()).collect()
    }

    /// `Get(name) → (schema, handler) | NOT_FOUND`. Used by `POST /call-tool`.
    pub fn get(&self, name: &str) -> Result<(&ToolSchema, &Arc<dyn ToolHandler>)> {
        self.tools
            .get(name)
            .map(|r| (&r.schema, &r.handler))
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// `Validate(name, arguments) → ok | VALIDATION_ERROR`.
    ///
    /// Validates an argument object against the named tool's stored schema.
    /// The error message cites the JSON-pointer path of the first offending
    /// field; callers wanting the full violation list should call
    /// [`schema::validate`] directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolNotFound`] if `name` is not registered, or
    /// [`Error::InvalidArguments`] if `arguments` fails schema validation.
    pub fn validate(&self, name: &str, arguments: &Value) -> Result<()> {
        let (tool_schema, _) = self.get(name)?;
        let violations = schema::validate(&tool_schema.input_schema, arguments);
        if violations.is_empty() {
            Ok(())
        } else {
            let detail = violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            Err(Error::InvalidArguments(detail))
        }
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry has no registered tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Assembles an immutable [`Registry`] during lifecycle startup. No dynamic
/// registration happens once the registry is built.
#[derive(Default)]
pub struct RegistryBuilder {
    tools: BTreeMap<String, ToolRecord>,
}

impl RegistryBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `Register(name, description, schema, handler)`.
    ///
    /// Rejects duplicate names and names not matching `^[a-z][a-z0-9_]*$`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArguments`] if the name is malformed or
    /// already registered.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<()> {
        let name = name.into();
        if !tool_name_re().is_match(&name) {
            return Err(Error::InvalidArguments(format!(
                "tool name {name:?} does not match ^[a-z][a-z0-9_]*$"
            )));
        }
        if self.tools.contains_key(&name) {
            return Err(Error::InvalidArguments(format!("duplicate tool registration: {name}")));
        }
        self.tools.insert(
            name.clone(),
            ToolRecord {
                schema: ToolSchema {
                    name,
                    description: description.into(),
                    input_schema,
                },
                handler,
            },
        );
        Ok(())
    }

    /// Freeze the builder into an immutable [`Registry`].
    #[must_use]
    pub fn build(self) -> Registry {
        Registry { tools: self.tools }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _ctx: &ToolContext, arguments: Value) -> Result<Value> {
            Ok(arguments)
        }
    }

    #[test]
    fn register_rejects_bad_name() {
        let mut builder = RegistryBuilder::new();
        let err = builder
            .register("Bad-Name", "desc", json!({"type": "object"}), Arc::new(Echo))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn register_rejects_duplicates() {
        let mut builder = RegistryBuilder::new();
        builder.register("echo", "desc", json!({"type": "object"}), Arc::new(Echo)).unwrap();
        let err = builder
            .register("echo", "desc", json!({"type": "object"}), Arc::new(Echo))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }

    #[test]
    fn list_is_sorted_by_name() {
        let mut builder = RegistryBuilder::new();
        builder.register("zeta", "desc", json!({"type": "object"}), Arc::new(Echo)).unwrap();
        builder.register("alpha", "desc", json!({"type": "object"}), Arc::new(Echo)).unwrap();
        let registry = builder.build();
        let names: Vec<_> = registry.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn get_missing_tool_is_not_found() {
        let registry = RegistryBuilder::new().build();
        assert!(matches!(registry.get("missing"), Err(Error::ToolNotFound(_))));
    }

    #[test]
    fn validate_reports_missing_required_field() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                "query_callers",
                "desc",
                json!({
                    "type": "object",
                    "properties": {"function_name": {"type": "string"}},
                    "required": ["function_name"]
                }),
                Arc::new(Echo),
            )
            .unwrap();
        let registry = builder.build();
        let err = registry.validate("query_callers", &json!({})).unwrap_err();
        assert!(matches!(err, Error::InvalidArguments(_)));
    }
}
