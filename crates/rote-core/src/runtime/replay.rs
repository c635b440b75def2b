//! Fixture replay: answer tool and UDF calls from recorded results.
//!
//! Lets a compiled routine run without touching real tools or a real UDF
//! implementation. A call matches a fixture when kind, name and canonical
//! argument JSON are equal; the earliest matching fixture wins.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::tools::{ToolArgs, ToolError, ToolRegistry};
use super::udf::{UdfError, UdfModule};
use crate::compiler::fixtures::{FixtureKind, FixtureSet, canonical_json};

#[derive(Debug, Clone)]
pub struct FixtureReplay {
    fixtures: Arc<FixtureSet>,
}

impl FixtureReplay {
    pub fn new(fixtures: FixtureSet) -> Self {
        Self {
            fixtures: Arc::new(fixtures),
        }
    }

    /// A registry with one replaying tool per recorded tool name.
    pub fn tool_registry(&self) -> ToolRegistry {
        let registry = ToolRegistry::new();
        self.register_tools(&registry);
        registry
    }

    /// Register replaying tools into an existing registry, replacing any
    /// tool with the same name.
    pub fn register_tools(&self, registry: &ToolRegistry) {
        for name in self.fixtures.names(FixtureKind::Tool) {
            let fixtures = Arc::clone(&self.fixtures);
            let tool_name = name.clone();
            registry.register(name, move |args: ToolArgs| {
                let found = fixtures
                    .lookup(FixtureKind::Tool, &tool_name, &args)
                    .cloned()
                    .ok_or_else(|| no_fixture(&tool_name, &args));
                async move { found.map_err(ToolError::Execution) }
            });
        }
    }

    /// A UDF module answering every recorded function.
    pub fn udf_module(&self) -> ReplayUdfModule {
        ReplayUdfModule {
            fixtures: Arc::clone(&self.fixtures),
        }
    }
}

/// UDF module backed by fixtures.
#[derive(Debug, Clone)]
pub struct ReplayUdfModule {
    fixtures: Arc<FixtureSet>,
}

impl UdfModule for ReplayUdfModule {
    fn call(&self, function: &str, args: &Map<String, Value>) -> Result<Value, UdfError> {
        if !self.has(function) {
            return Err(UdfError::NotFound(function.to_string()));
        }
        self.fixtures
            .lookup(FixtureKind::Udf, function, args)
            .cloned()
            .ok_or_else(|| UdfError::Execution(no_fixture(function, args)))
    }

    fn functions(&self) -> Vec<String> {
        self.fixtures.names(FixtureKind::Udf)
    }
}

fn no_fixture(name: &str, args: &Map<String, Value>) -> String {
    format!(
        "no recorded result for {name}({})",
        canonical_json(&Value::Object(args.clone()))
    )
}
