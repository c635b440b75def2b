//! Built-in functions callable from expressions.
//!
//! The expression environment starts empty, so this allow-list is the only
//! callable surface. Every function is pure and works on JSON values.

use minijinja::value::Rest;
use minijinja::{Environment, Error, ErrorKind, Value};
use serde_json::Value as Json;

/// Names accepted in call position.
pub const ALLOWED_FUNCTIONS: &[&str] = &[
    "count",
    "len",
    "lower",
    "upper",
    "trim",
    "contains",
    "starts_with",
    "ends_with",
    "keys",
    "values",
    "sum",
    "min",
    "max",
    "abs",
    "round",
    "str",
    "int",
    "float",
    "bool",
    "is_empty",
];

/// Words with a fixed meaning in expression syntax.
pub const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "true", "false", "none", "True", "False", "None",
];

type JsonResult = Result<Json, String>;

pub(crate) fn register(env: &mut Environment<'static>) {
    env.add_function("count", |v: Value| unary(&v, count));
    env.add_function("len", |v: Value| unary(&v, count));
    env.add_function("lower", |v: Value| unary(&v, |j| string_op(j, "lower", str::to_lowercase)));
    env.add_function("upper", |v: Value| unary(&v, |j| string_op(j, "upper", str::to_uppercase)));
    env.add_function("trim", |v: Value| unary(&v, |j| string_op(j, "trim", |s| s.trim().to_string())));
    env.add_function("contains", |a: Value, b: Value| {
        binary(&a, &b, |h, n| contains(h, n).map(Json::Bool))
    });
    env.add_function("starts_with", |a: Value, b: Value| {
        binary(&a, &b, |s, p| affix(s, p, "starts_with", |s: &str, p: &str| s.starts_with(p)))
    });
    env.add_function("ends_with", |a: Value, b: Value| {
        binary(&a, &b, |s, p| affix(s, p, "ends_with", |s: &str, p: &str| s.ends_with(p)))
    });
    env.add_function("keys", |v: Value| unary(&v, |j| entries(j, "keys", true)));
    env.add_function("values", |v: Value| unary(&v, |j| entries(j, "values", false)));
    env.add_function("sum", |v: Value| unary(&v, sum));
    env.add_function("min", |args: Rest<Value>| variadic(&args, |items| extreme(items, "min")));
    env.add_function("max", |args: Rest<Value>| variadic(&args, |items| extreme(items, "max")));
    env.add_function("abs", |v: Value| unary(&v, abs));
    env.add_function("round", |v: Value, digits: Option<i64>| {
        unary(&v, |j| round(j, digits.unwrap_or(0)))
    });
    env.add_function("str", |v: Value| unary(&v, |j| Ok(Json::String(super::display_string(j)))));
    env.add_function("int", |v: Value| unary(&v, int));
    env.add_function("float", |v: Value| unary(&v, float));
    env.add_function("bool", |v: Value| unary(&v, |j| Ok(Json::Bool(super::is_truthy(j)))));
    env.add_function("is_empty", |v: Value| unary(&v, is_empty));
}

// ---------------------------------------------------------------------------
// Adapters between engine values and JSON
// ---------------------------------------------------------------------------

fn to_json(value: &Value) -> Result<Json, Error> {
    serde_json::to_value(value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

fn finish(result: JsonResult) -> Result<Value, Error> {
    result
        .map(|json| Value::from_serialize(&json))
        .map_err(|message| Error::new(ErrorKind::InvalidOperation, message))
}

fn unary(v: &Value, f: impl Fn(&Json) -> JsonResult) -> Result<Value, Error> {
    finish(f(&to_json(v)?))
}

fn binary(a: &Value, b: &Value, f: impl Fn(&Json, &Json) -> JsonResult) -> Result<Value, Error> {
    finish(f(&to_json(a)?, &to_json(b)?))
}

fn variadic(args: &[Value], f: impl Fn(Vec<Json>) -> JsonResult) -> Result<Value, Error> {
    let items = args.iter().map(to_json).collect::<Result<Vec<_>, _>>()?;
    finish(f(items))
}

fn rejects(function: &str, value: &Json) -> String {
    format!("{function}() does not accept {}", type_name(value))
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn count(v: &Json) -> JsonResult {
    let n = match v {
        Json::Array(a) => a.len(),
        Json::Object(o) => o.len(),
        Json::String(s) => s.chars().count(),
        other => return Err(rejects("count", other)),
    };
    Ok(Json::from(n as u64))
}

fn string_op(v: &Json, name: &str, op: impl Fn(&str) -> String) -> JsonResult {
    v.as_str()
        .map(|s| Json::String(op(s)))
        .ok_or_else(|| rejects(name, v))
}

fn affix(s: &Json, p: &Json, name: &str, test: fn(&str, &str) -> bool) -> JsonResult {
    match (s, p) {
        (Json::String(s), Json::String(p)) => Ok(Json::Bool(test(s, p))),
        (Json::String(_), other) | (other, _) => Err(rejects(name, other)),
    }
}

fn entries(v: &Json, name: &str, keys: bool) -> JsonResult {
    let obj = v.as_object().ok_or_else(|| rejects(name, v))?;
    Ok(Json::Array(if keys {
        obj.keys().cloned().map(Json::String).collect()
    } else {
        obj.values().cloned().collect()
    }))
}

fn sum(v: &Json) -> JsonResult {
    let items = v.as_array().ok_or_else(|| rejects("sum", v))?;
    let mut total = Num::Int(0);
    for item in items {
        total = total.add(Num::of(item).ok_or_else(|| rejects("sum", item))?);
    }
    Ok(total.into_json())
}

fn extreme(args: Vec<Json>, name: &str) -> JsonResult {
    let mut items = args;
    if items.len() == 1 && items[0].is_array() {
        if let Some(Json::Array(inner)) = items.pop() {
            items = inner;
        }
    }
    let mut best: Option<(f64, Json)> = None;
    for item in items {
        let n = Num::of(&item).ok_or_else(|| rejects(name, &item))?.as_f64();
        let replace = match &best {
            None => true,
            Some((b, _)) if name == "min" => n < *b,
            Some((b, _)) => n > *b,
        };
        if replace {
            best = Some((n, item));
        }
    }
    best.map(|(_, v)| v)
        .ok_or_else(|| format!("{name}() of an empty sequence"))
}

fn abs(v: &Json) -> JsonResult {
    match Num::of(v).ok_or_else(|| rejects("abs", v))? {
        Num::Int(i) => Ok(i
            .checked_abs()
            .map(Json::from)
            .unwrap_or_else(|| Num::Float((i as f64).abs()).into_json())),
        Num::Float(f) => Ok(Num::Float(f.abs()).into_json()),
    }
}

fn round(v: &Json, digits: i64) -> JsonResult {
    match Num::of(v).ok_or_else(|| rejects("round", v))? {
        Num::Int(i) => Ok(Json::from(i)),
        Num::Float(f) if digits <= 0 => {
            let r = f.round();
            if r.abs() < i64::MAX as f64 {
                Ok(Json::from(r as i64))
            } else {
                Ok(Num::Float(r).into_json())
            }
        }
        Num::Float(f) => {
            let factor = 10f64.powi(digits.min(15) as i32);
            Ok(Num::Float((f * factor).round() / factor).into_json())
        }
    }
}

fn parse_number(s: &str, name: &str) -> Result<f64, String> {
    s.trim()
        .parse::<f64>()
        .map_err(|_| format!("{name}() cannot parse '{s}'"))
}

fn int(v: &Json) -> JsonResult {
    let n = match v {
        Json::String(s) => parse_number(s, "int")?,
        Json::Bool(b) => f64::from(u8::from(*b)),
        Json::Number(_) => match Num::of(v) {
            Some(Num::Int(i)) => return Ok(Json::from(i)),
            Some(n) => n.as_f64(),
            None => return Err(rejects("int", v)),
        },
        other => return Err(rejects("int", other)),
    };
    Ok(Json::from(n.trunc() as i64))
}

fn float(v: &Json) -> JsonResult {
    let n = match v {
        Json::String(s) => parse_number(s, "float")?,
        other => Num::of(other).ok_or_else(|| rejects("float", other))?.as_f64(),
    };
    Ok(Num::Float(n).into_json())
}

fn is_empty(v: &Json) -> JsonResult {
    Ok(Json::Bool(match v {
        Json::Null => true,
        Json::String(s) => s.is_empty(),
        Json::Array(a) => a.is_empty(),
        Json::Object(o) => o.is_empty(),
        other => return Err(rejects("is_empty", other)),
    }))
}

/// Membership test backing `contains()`.
fn contains(haystack: &Json, needle: &Json) -> Result<bool, String> {
    match (haystack, needle) {
        (Json::Array(items), _) => Ok(items.iter().any(|item| numbers_equal(item, needle))),
        (Json::String(s), Json::String(n)) => Ok(s.contains(n.as_str())),
        (Json::Object(o), Json::String(k)) => Ok(o.contains_key(k)),
        (Json::String(_) | Json::Object(_), other) => {
            Err(format!("cannot search {} for {}", type_name(haystack), type_name(other)))
        }
        (other, _) => Err(format!("{} is not a container", type_name(other))),
    }
}

/// Structural equality where `1 == 1.0`.
fn numbers_equal(a: &Json, b: &Json) -> bool {
    match (Num::of(a), Num::of(b)) {
        (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
        (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn of(value: &Json) -> Option<Num> {
        let n = value.as_number()?;
        match n.as_i64() {
            Some(i) => Some(Num::Int(i)),
            None => n.as_f64().map(Num::Float),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    fn add(self, other: Num) -> Num {
        match (self, other) {
            (Num::Int(a), Num::Int(b)) => a
                .checked_add(b)
                .map(Num::Int)
                .unwrap_or(Num::Float(a as f64 + b as f64)),
            (a, b) => Num::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn into_json(self) -> Json {
        match self {
            Num::Int(i) => Json::from(i),
            Num::Float(f) => serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
        }
    }
}

pub(crate) fn type_name(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

// ---------------------------------------------------------------------------
// Call-site scan
// ---------------------------------------------------------------------------

/// A name an expression invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CallSite {
    /// `name(...)`
    Function(String),
    /// A method call, filter or test: `x.name()`, `x | name`, `x is name`.
    Other(String),
}

impl CallSite {
    pub(crate) fn is_allowed(&self) -> bool {
        matches!(self, CallSite::Function(name) if ALLOWED_FUNCTIONS.contains(&name.as_str()))
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            CallSite::Function(name) | CallSite::Other(name) => name,
        }
    }
}

/// Names used in call, filter or test position, outside string literals.
pub(crate) fn call_sites(src: &str) -> Vec<CallSite> {
    let chars: Vec<char> = src.chars().collect();
    let mut sites = Vec::new();
    let mut prev: Option<char> = None;
    let mut after_is = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            i += 1;
            while i < chars.len() && chars[i] != c {
                if chars[i] == '\\' {
                    i += 1;
                }
                i += 1;
            }
            i += 1;
            prev = Some(c);
            after_is = false;
            continue;
        }

        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.' || chars[i] == '_') {
                i += 1;
            }
            prev = Some('0');
            after_is = false;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            let next = chars[i..].iter().find(|c| !c.is_whitespace());

            if after_is && word != "not" {
                sites.push(CallSite::Other(word.clone()));
                after_is = false;
            } else if prev == Some('|') {
                sites.push(CallSite::Other(word.clone()));
            } else if next == Some(&'(') && !KEYWORDS.contains(&word.as_str()) {
                if prev == Some('.') {
                    sites.push(CallSite::Other(word.clone()));
                } else {
                    sites.push(CallSite::Function(word.clone()));
                }
            }
            if word == "is" && prev != Some('.') {
                after_is = true;
            }
            prev = Some('a');
            continue;
        }

        if !c.is_whitespace() {
            prev = Some(c);
            after_is = false;
        }
        i += 1;
    }
    sites
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_count_over_sequences_and_mappings() {
        assert_eq!(count(&json!([1, 2, 3])).unwrap(), json!(3));
        assert_eq!(count(&json!({"a": 1})).unwrap(), json!(1));
        assert_eq!(count(&json!("héllo")).unwrap(), json!(5));
        assert!(count(&json!(5)).is_err());
    }

    #[test]
    fn test_numeric_helpers() {
        assert_eq!(sum(&json!([1, 2, 3])).unwrap(), json!(6));
        assert_eq!(sum(&json!([1, 2.5])).unwrap(), json!(3.5));
        assert_eq!(extreme(vec![json!([3, 9, 2])], "max").unwrap(), json!(9));
        assert_eq!(extreme(vec![json!(4), json!(1)], "min").unwrap(), json!(1));
        assert!(extreme(vec![json!([])], "max").is_err());
        assert_eq!(abs(&json!(-4)).unwrap(), json!(4));
        assert_eq!(round(&json!(2.6), 0).unwrap(), json!(3));
        assert_eq!(round(&json!(2.346), 2).unwrap(), json!(2.35));
        assert_eq!(int(&json!("42")).unwrap(), json!(42));
        assert_eq!(int(&json!(3.9)).unwrap(), json!(3));
        assert_eq!(float(&json!("1.5")).unwrap(), json!(1.5));
    }

    #[test]
    fn test_membership() {
        assert!(contains(&json!([1, 2]), &json!(2.0)).unwrap());
        assert!(contains(&json!("fixture://a"), &json!("://")).unwrap());
        assert!(contains(&json!({"rows": 1}), &json!("rows")).unwrap());
        assert!(contains(&json!(5), &json!(5)).is_err());
    }

    #[test]
    fn test_is_empty() {
        assert_eq!(is_empty(&json!([])).unwrap(), json!(true));
        assert_eq!(is_empty(&json!(null)).unwrap(), json!(true));
        assert_eq!(is_empty(&json!("x")).unwrap(), json!(false));
        assert!(is_empty(&json!(1)).is_err());
    }

    #[test]
    fn test_call_sites() {
        assert_eq!(
            call_sites("count(rows) > 0 and not (x in y)"),
            vec![CallSite::Function("count".into())]
        );
        assert_eq!(call_sites("name.upper()"), vec![CallSite::Other("upper".into())]);
        assert_eq!(call_sites("name | lower"), vec![CallSite::Other("lower".into())]);
        assert_eq!(call_sites("x is not defined"), vec![CallSite::Other("defined".into())]);
        assert!(call_sites("'system(1)' == s").is_empty());
        assert!(call_sites("1.5 * n").is_empty());
    }

    #[test]
    fn test_allow_list() {
        assert!(CallSite::Function("trim".into()).is_allowed());
        assert!(!CallSite::Function("system".into()).is_allowed());
        assert!(!CallSite::Other("lower".into()).is_allowed());
    }
}
