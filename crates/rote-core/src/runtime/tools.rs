//! Tool registry.
//!
//! Tools are the side-effecting half of a routine: everything a `tool.call`
//! step invokes is looked up here by name. A tool may carry a JSON Schema
//! for its arguments, checked before the tool runs.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

/// Arguments passed to a tool, already resolved against the run context.
pub type ToolArgs = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Execution(String),

    /// Authentication or authorization failure. Never auto-fixed.
    #[error("credential error: {0}")]
    Credential(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl ToolError {
    pub fn is_credential(&self) -> bool {
        matches!(self, ToolError::Credential(_))
    }
}

/// A callable tool.
///
/// Object-safe so tools of different types can share one registry. Any
/// `Fn(ToolArgs) -> impl Future<Output = Result<Value, ToolError>>` closure
/// is a tool.
pub trait Tool: Send + Sync {
    fn call<'a>(&'a self, args: ToolArgs) -> BoxFuture<'a, Result<Value, ToolError>>;
}

impl<F, Fut> Tool for F
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn call<'a>(&'a self, args: ToolArgs) -> BoxFuture<'a, Result<Value, ToolError>> {
        Box::pin(self(args))
    }
}

#[derive(Clone)]
struct RegisteredTool {
    tool: Arc<dyn Tool>,
    args_validator: Option<Arc<jsonschema::Validator>>,
}

/// Name -> tool table shared by every run of an engine.
///
/// Cloning is cheap; clones share the same table.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<DashMap<String, RegisteredTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a tool.
    pub fn register(&self, name: impl Into<String>, tool: impl Tool + 'static) {
        let name = name.into();
        tracing::debug!(tool = %name, "registered tool");
        self.tools.insert(
            name,
            RegisteredTool {
                tool: Arc::new(tool),
                args_validator: None,
            },
        );
    }

    /// Register a tool whose arguments must satisfy `args_schema`.
    pub fn register_with_schema(
        &self,
        name: impl Into<String>,
        tool: impl Tool + 'static,
        args_schema: &Value,
    ) -> Result<(), ToolError> {
        let name = name.into();
        let validator = jsonschema::validator_for(args_schema).map_err(|e| {
            ToolError::InvalidArgs(format!("invalid args schema for '{name}': {e}"))
        })?;
        tracing::debug!(tool = %name, "registered tool with args schema");
        self.tools.insert(
            name,
            RegisteredTool {
                tool: Arc::new(tool),
                args_validator: Some(Arc::new(validator)),
            },
        );
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
        self.tools
            .get(name)
            .map(|entry| Arc::clone(&entry.tool))
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Validate `args` and invoke the named tool.
    pub async fn call(&self, name: &str, args: ToolArgs) -> Result<Value, ToolError> {
        // Clone out of the map so no shard lock is held across the await.
        let registered = self
            .tools
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        if let Some(validator) = &registered.args_validator {
            let instance = Value::Object(args.clone());
            let problems: Vec<String> = validator
                .iter_errors(&instance)
                .map(|e| e.to_string())
                .collect();
            if !problems.is_empty() {
                return Err(ToolError::InvalidArgs(problems.join("; ")));
            }
        }

        registered.tool.call(args).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register("echo", |args: ToolArgs| async move {
            Ok::<_, ToolError>(Value::Object(args))
        });
        registry
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = echo_registry();
        let mut args = Map::new();
        args.insert("x".into(), json!(1));
        let out = registry.call("echo", args).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
        assert!(registry.has("echo"));
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let registry = echo_registry();
        assert_eq!(
            registry.call("nope", Map::new()).await.unwrap_err(),
            ToolError::NotFound("nope".into())
        );
        assert!(registry.resolve("nope").is_err());
    }

    #[tokio::test]
    async fn test_args_schema_is_enforced() {
        let registry = ToolRegistry::new();
        registry
            .register_with_schema(
                "fetch",
                |_args: ToolArgs| async { Ok::<_, ToolError>(json!("ok")) },
                &json!({
                    "type": "object",
                    "properties": {"url": {"type": "string"}},
                    "required": ["url"]
                }),
            )
            .unwrap();

        let err = registry.call("fetch", Map::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));

        let mut args = Map::new();
        args.insert("url".into(), json!("fixture://a.csv"));
        assert_eq!(registry.call("fetch", args).await.unwrap(), json!("ok"));
    }

    #[test]
    fn test_bad_schema_rejected_at_registration() {
        let registry = ToolRegistry::new();
        let result = registry.register_with_schema(
            "t",
            |_args: ToolArgs| async { Ok::<_, ToolError>(Value::Null) },
            &json!({"type": "strng"}),
        );
        assert!(result.is_err());
        assert!(!registry.has("t"));
    }

    #[tokio::test]
    async fn test_clones_share_table() {
        let registry = ToolRegistry::new();
        let clone = registry.clone();
        clone.register("late", |_args: ToolArgs| async { Ok::<_, ToolError>(json!(7)) });
        assert_eq!(registry.call("late", Map::new()).await.unwrap(), json!(7));
    }

    #[tokio::test]
    async fn test_credential_error_classification() {
        let registry = ToolRegistry::new();
        registry.register("secure", |_args: ToolArgs| async {
            Err::<Value, _>(ToolError::Credential("401 Unauthorized".into()))
        });
        let err = registry.call("secure", Map::new()).await.unwrap_err();
        assert!(err.is_credential());
    }
}
