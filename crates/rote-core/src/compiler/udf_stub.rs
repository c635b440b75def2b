//! UDF signatures and stub module generation.
//!
//! The compiler cannot know what a recorded UDF computed, only the shapes
//! of what went in and came out. It emits those shapes as a manifest and
//! a Rhai module whose functions throw until someone implements them.

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::schema::infer_schema;

/// Inferred signatures for every UDF a routine calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UdfManifest {
    #[serde(default)]
    pub functions: Vec<UdfSignature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdfSignature {
    pub name: String,
    pub params: Vec<UdfParam>,
    pub returns: Value,
    /// False for generated stubs.
    #[serde(default)]
    pub implemented: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdfParam {
    pub name: String,
    pub schema: Value,
}

impl UdfManifest {
    pub fn get(&self, name: &str) -> Option<&UdfSignature> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Record a call. Parameters are the union of argument names across
    /// calls; the first call to use a name fixes its schema, and the first
    /// call of the function fixes the return schema.
    pub fn observe(&mut self, name: &str, args: &Map<String, Value>, result: &Value) {
        if let Some(sig) = self.functions.iter_mut().find(|f| f.name == name) {
            for (k, v) in args {
                if !sig.params.iter().any(|p| p.name == *k) {
                    sig.params.push(UdfParam {
                        name: k.clone(),
                        schema: infer_schema(v),
                    });
                }
            }
            return;
        }
        self.functions.push(UdfSignature {
            name: name.to_string(),
            params: args
                .iter()
                .map(|(k, v)| UdfParam {
                    name: k.clone(),
                    schema: infer_schema(v),
                })
                .collect(),
            returns: infer_schema(result),
            implemented: false,
        });
    }

    pub fn names(&self) -> Vec<String> {
        self.functions.iter().map(|f| f.name.clone()).collect()
    }
}

const RESERVED: &[&str] = &[
    "let", "const", "if", "else", "switch", "do", "while", "loop", "until", "for", "in",
    "continue", "break", "return", "throw", "try", "catch", "fn", "private", "import", "export",
    "as", "true", "false", "global", "this", "is", "var", "static", "match", "case", "new",
    "use", "with", "module", "package", "super", "default", "null", "nil", "void", "print",
    "debug", "eval", "type_of", "call", "curry", "Fn",
];

/// Map an arbitrary name onto a valid script identifier.
pub fn script_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if RESERVED.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

fn schema_label(schema: &Value) -> String {
    schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("any")
        .to_string()
}

/// Render a Rhai module with one throwing stub per function.
pub fn render_rhai_stub(routine_name: &str, manifest: &UdfManifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "// UDF module for routine `{routine_name}`.");
    let _ = writeln!(
        out,
        "// Each function receives the step's keyword args by parameter name;"
    );
    let _ = writeln!(
        out,
        "// a parameter some recorded calls did not pass arrives as ()."
    );
    for sig in &manifest.functions {
        let params: Vec<String> = sig.params.iter().map(|p| script_identifier(&p.name)).collect();
        let described: Vec<String> = sig
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, schema_label(&p.schema)))
            .collect();
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "// {}({}) -> {}",
            sig.name,
            described.join(", "),
            schema_label(&sig.returns)
        );
        let _ = writeln!(out, "fn {}({}) {{", script_identifier(&sig.name), params.join(", "));
        let _ = writeln!(out, "    throw \"{} is not implemented\";", sig.name);
        let _ = writeln!(out, "}}");
    }
    out
}

/// Names of the top-level functions a script source declares.
///
/// A line scan, not a parser: it is used to sanity-check generated modules
/// before a real script engine is available.
pub fn declared_functions(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines() {
        let line = line.trim_start();
        let rest = line
            .strip_prefix("private fn ")
            .or_else(|| line.strip_prefix("fn "));
        if let Some(rest) = rest {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}
