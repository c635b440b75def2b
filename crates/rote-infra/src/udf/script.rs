//! Rhai-backed UDF module.
//!
//! A package's `udf.rhai` is compiled once. Each `udf.call` step passes
//! keyword arguments, which are matched to the script function's parameters
//! by name (after the same identifier sanitizing the stub generator uses)
//! and passed positionally. A parameter with no matching argument receives
//! `()`, since recorded calls of one function may use different subsets of
//! its parameters.

use std::collections::BTreeMap;
use std::path::Path;

use rhai::{AST, Dynamic, Engine, Scope};
use serde_json::{Map, Value};

use rote_core::compiler::udf_stub::script_identifier;
use rote_core::runtime::{UdfError, UdfModule};

/// Upper bound on script operations per call.
const DEFAULT_MAX_OPERATIONS: u64 = 50_000_000;

/// A compiled Rhai script exposing its top-level functions as UDFs.
pub struct RhaiUdfModule {
    engine: Engine,
    ast: AST,
    /// Function name -> parameter names, in declaration order.
    params: BTreeMap<String, Vec<String>>,
}

impl RhaiUdfModule {
    /// Compile `source`. Syntax errors surface as `UdfError::Load`.
    pub fn compile(source: &str) -> Result<Self, UdfError> {
        let engine = create_engine();
        let ast = engine
            .compile(source)
            .map_err(|e| UdfError::Load(e.to_string()))?;

        let mut params = BTreeMap::new();
        for f in ast.iter_functions() {
            params
                .entry(f.name.to_string())
                .or_insert_with(|| f.params.iter().map(|p| p.to_string()).collect());
        }

        tracing::debug!(functions = params.len(), "compiled UDF module");
        Ok(Self { engine, ast, params })
    }

    /// Read and compile a script file.
    pub fn load(path: &Path) -> Result<Self, UdfError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| UdfError::Load(format!("{}: {e}", path.display())))?;
        Self::compile(&source)
    }

    pub fn with_max_operations(mut self, max: u64) -> Self {
        self.engine.set_max_operations(max);
        self
    }

    /// Order keyword arguments by parameter list.
    fn positional_args(
        &self,
        function: &str,
        params: &[String],
        args: &Map<String, Value>,
    ) -> Result<Vec<Dynamic>, UdfError> {
        if let Some(key) = args
            .keys()
            .find(|key| !params.iter().any(|p| *p == script_identifier(key)))
        {
            return Err(UdfError::InvalidArgs {
                function: function.to_string(),
                message: format!("unexpected argument '{key}'"),
            });
        }

        Ok(params
            .iter()
            .map(|param| {
                args.iter()
                    .find(|(key, _)| script_identifier(key) == *param)
                    .map_or(Dynamic::UNIT, |(_, value)| json_to_dynamic(value))
            })
            .collect())
    }
}

impl UdfModule for RhaiUdfModule {
    fn call(&self, function: &str, args: &Map<String, Value>) -> Result<Value, UdfError> {
        let params = self
            .params
            .get(function)
            .ok_or_else(|| UdfError::NotFound(function.to_string()))?;
        let positional = self.positional_args(function, params, args)?;

        let mut scope = Scope::new();
        let result = self
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.ast, function, positional)
            .map_err(|e| UdfError::Execution(format!("{function}: {e}")))?;
        Ok(dynamic_to_json(&result))
    }

    fn functions(&self) -> Vec<String> {
        self.params.keys().cloned().collect()
    }

    fn has(&self, function: &str) -> bool {
        self.params.contains_key(function)
    }
}

impl std::fmt::Debug for RhaiUdfModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiUdfModule")
            .field("functions", &self.functions())
            .finish()
    }
}

fn create_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(DEFAULT_MAX_OPERATIONS);

    engine.on_print(|msg| tracing::info!(target: "rhai", "{msg}"));
    engine.on_debug(|msg, _source, pos| tracing::debug!(target: "rhai", %pos, "{msg}"));

    engine.register_fn("parse_json", |s: &str| -> Dynamic {
        serde_json::from_str::<Value>(s)
            .map(|v| json_to_dynamic(&v))
            .unwrap_or(Dynamic::UNIT)
    });
    engine.register_fn("to_json", |value: Dynamic| -> String {
        dynamic_to_json(&value).to_string()
    });

    engine
}

// ---------------------------------------------------------------------------
// JSON <-> Dynamic
// ---------------------------------------------------------------------------

pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from(i),
            None => n.as_f64().map(Dynamic::from).unwrap_or(Dynamic::UNIT),
        },
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => Dynamic::from(items.iter().map(json_to_dynamic).collect::<rhai::Array>()),
        Value::Object(obj) => {
            let mut map = rhai::Map::new();
            for (k, v) in obj {
                map.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

pub fn dynamic_to_json(value: &Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::from(i);
    }
    if let Ok(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.to_string());
    }
    if value.is_string() {
        return value
            .clone()
            .into_string()
            .map(Value::String)
            .unwrap_or(Value::Null);
    }
    if value.is_array() {
        let items = value.clone().into_array().unwrap_or_default();
        return Value::Array(items.iter().map(dynamic_to_json).collect());
    }
    if let Some(map) = value.clone().try_cast::<rhai::Map>() {
        return Value::Object(
            map.iter()
                .map(|(k, v)| (k.to_string(), dynamic_to_json(v)))
                .collect(),
        );
    }
    Value::String(value.to_string())
}
