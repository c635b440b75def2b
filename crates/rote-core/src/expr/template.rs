//! `{{ ... }}` template resolution.
//!
//! A string that is exactly one token resolves to the referenced value with
//! its type preserved. Tokens embedded in other text are rendered to strings
//! and concatenated. A `{{` with no closing `}}` after it is plain text.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use rote_types::context::Context;

use super::ExpressionError;
use super::eval::{Compiled, display_string};

#[derive(Debug, Clone, PartialEq)]
enum Segment<'a> {
    Text(&'a str),
    Token(&'a str),
}

fn split(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            break;
        };
        if start > 0 {
            segments.push(Segment::Text(&rest[..start]));
        }
        segments.push(Segment::Token(&after[..end]));
        rest = &after[end + 2..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

fn eval_token(src: &str, ctx: &Context) -> Result<Value, ExpressionError> {
    Compiled::new(src)?.eval(src, ctx)
}

/// Resolve a template string against the context.
pub fn resolve_template(text: &str, ctx: &Context) -> Result<Value, ExpressionError> {
    match split(text).as_slice() {
        [] => Ok(Value::String(String::new())),
        [Segment::Token(src)] => eval_token(src, ctx),
        [Segment::Text(t)] => Ok(Value::String((*t).to_string())),
        many => {
            let mut out = String::new();
            for segment in many {
                match segment {
                    Segment::Text(t) => out.push_str(t),
                    Segment::Token(src) => out.push_str(&display_string(&eval_token(src, ctx)?)),
                }
            }
            Ok(Value::String(out))
        }
    }
}

/// Resolve every string inside `value`, recursing into arrays and objects.
pub fn resolve_value(value: &Value, ctx: &Context) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => resolve_template(s, ctx),
        Value::Array(items) => Ok(Value::Array(
            items
                .iter()
                .map(|v| resolve_value(v, ctx))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Value::Object(map) => Ok(Value::Object(resolve_args(map, ctx)?)),
        other => Ok(other.clone()),
    }
}

/// Resolve call arguments field by field.
pub fn resolve_args(
    args: &Map<String, Value>,
    ctx: &Context,
) -> Result<Map<String, Value>, ExpressionError> {
    let mut out = Map::new();
    for (k, v) in args {
        out.insert(k.clone(), resolve_value(v, ctx)?);
    }
    Ok(out)
}

/// Root variables referenced by a template string.
pub fn template_references(text: &str) -> Result<BTreeSet<String>, ExpressionError> {
    let mut refs = BTreeSet::new();
    for segment in split(text) {
        if let Segment::Token(src) = segment {
            refs.extend(Compiled::new(src)?.references());
        }
    }
    Ok(refs)
}

/// Root variables referenced anywhere inside a JSON value's strings.
pub fn value_references(value: &Value) -> Result<BTreeSet<String>, ExpressionError> {
    let mut refs = BTreeSet::new();
    match value {
        Value::String(s) => refs.extend(template_references(s)?),
        Value::Array(items) => {
            for item in items {
                refs.extend(value_references(item)?);
            }
        }
        Value::Object(map) => {
            for v in map.values() {
                refs.extend(value_references(v)?);
            }
        }
        _ => {}
    }
    Ok(refs)
}

/// Whether `text` contains at least one complete template token.
pub fn is_template(text: &str) -> bool {
    split(text).iter().any(|s| matches!(s, Segment::Token(_)))
}

/// Rewrite `text` so that it resolves back to itself verbatim.
pub fn escape_literal(text: &str) -> String {
    if is_template(text) {
        text.replace("{{", "{{ '{{' }}")
    } else {
        text.to_string()
    }
}

/// [`escape_literal`] applied to every string inside `value`.
pub fn escape_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(escape_literal(s)),
        Value::Array(items) => Value::Array(items.iter().map(escape_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), escape_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
