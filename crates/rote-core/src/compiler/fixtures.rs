//! Recorded call results captured at compile time.
//!
//! One fixture per tool/UDF event. Replay matches a call by kind, name and
//! canonical argument JSON, so fixtures stay valid when step ids change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    Tool,
    Udf,
}

/// A single recorded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub seq: u64,
    pub step_id: String,
    pub kind: FixtureKind,
    pub name: String,
    pub args: Map<String, Value>,
    pub result: Value,
}

/// All fixtures of a package, in event order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureSet {
    pub fixtures: Vec<Fixture>,
}

impl FixtureSet {
    pub fn new(mut fixtures: Vec<Fixture>) -> Self {
        fixtures.sort_by_key(|f| f.seq);
        Self { fixtures }
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fixtures.len()
    }

    /// First recorded result for this call, in event order.
    pub fn lookup(&self, kind: FixtureKind, name: &str, args: &Map<String, Value>) -> Option<&Value> {
        let wanted = canonical_json(&Value::Object(args.clone()));
        self.fixtures
            .iter()
            .find(|f| {
                f.kind == kind
                    && f.name == name
                    && canonical_json(&Value::Object(f.args.clone())) == wanted
            })
            .map(|f| &f.result)
    }

    /// Distinct names recorded for `kind`.
    pub fn names(&self, kind: FixtureKind) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for f in self.fixtures.iter().filter(|f| f.kind == kind) {
            if !names.contains(&f.name) {
                names.push(f.name.clone());
            }
        }
        names
    }
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sorted(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
