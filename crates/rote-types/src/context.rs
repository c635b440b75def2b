//! Per-run variable namespace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Variables visible to a single run.
///
/// Seeded from the run input, then written only through `save_as`. Keys are
/// never removed; writing an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    vars: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from a run input object.
    pub fn from_input(input: Map<String, Value>) -> Self {
        Self { vars: input }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    /// Write a variable (last write wins).
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Variable names currently defined.
    pub fn keys(&self) -> Vec<String> {
        self.vars.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }

    /// The whole context as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.vars.clone())
    }
}
