//! Expression evaluation against a run context.
//!
//! Expressions use Jinja syntax and are compiled by a shared minijinja
//! environment that starts empty: no filters, no tests, no globals beyond
//! `null`, and only the allow-listed functions. Undefined handling is strict,
//! and any referenced path missing from the context is an error even when
//! the engine itself would have tolerated it.
//!
//! Truthiness follows the usual scripting convention: `null`, `false`, zero,
//! the empty string, the empty array and the empty object are falsy.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use minijinja::{Environment, Error, ErrorKind, Expression, UndefinedBehavior, Value};
use serde_json::Value as Json;

use rote_types::context::Context;

use super::ExpressionError;
use super::functions::{self, CallSite, call_sites};

/// Names bound in every evaluation besides the run context.
const GLOBALS: &[&str] = &["null"];

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::empty();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_global("null", Value::from(()));
    functions::register(&mut env);
    env
});

/// A compiled expression together with the names it calls.
pub(crate) struct Compiled {
    expr: Expression<'static, 'static>,
    calls: Vec<CallSite>,
}

impl Compiled {
    /// Compile `src`, rejecting calls outside the allow-list.
    pub(crate) fn new(src: &str) -> Result<Self, ExpressionError> {
        let expr = ENV
            .compile_expression_owned(src.to_string())
            .map_err(map_error)?;
        let calls = call_sites(src);
        if let Some(site) = calls.iter().find(|c| !c.is_allowed()) {
            return Err(ExpressionError::ForbiddenFunction(site.name().to_string()));
        }
        Ok(Self { expr, calls })
    }

    fn is_function(&self, name: &str) -> bool {
        GLOBALS.contains(&name)
            || self
                .calls
                .iter()
                .any(|c| matches!(c, CallSite::Function(f) if f == name))
    }

    /// Root variable names the expression reads.
    pub(crate) fn references(&self) -> BTreeSet<String> {
        self.expr
            .undeclared_variables(false)
            .into_iter()
            .filter(|name| !self.is_function(name))
            .collect()
    }

    /// The first referenced path the context cannot resolve.
    fn missing_path(&self, ctx: &Context) -> Option<String> {
        let paths: BTreeSet<String> = self.expr.undeclared_variables(true).into_iter().collect();
        paths.into_iter().find(|path| {
            let root = path.split('.').next().unwrap_or(path);
            if !ctx.contains(root) && self.is_function(root) {
                return false;
            }
            !resolves(ctx, path)
        })
    }

    pub(crate) fn eval(&self, src: &str, ctx: &Context) -> Result<Json, ExpressionError> {
        let undefined = |path: Option<String>| {
            ExpressionError::UndefinedVariable(path.unwrap_or_else(|| src.trim().to_string()))
        };

        let value = match self.expr.eval(ctx.as_map()) {
            Ok(value) => value,
            Err(e) => {
                return Err(match e.kind() {
                    ErrorKind::UnknownFunction
                    | ErrorKind::UnknownMethod
                    | ErrorKind::UnknownFilter
                    | ErrorKind::UnknownTest => map_error(e),
                    ErrorKind::UndefinedError => undefined(self.missing_path(ctx)),
                    _ => match self.missing_path(ctx) {
                        Some(path) => ExpressionError::UndefinedVariable(path),
                        None => map_error(e),
                    },
                });
            }
        };

        if let Some(path) = self.missing_path(ctx) {
            return Err(ExpressionError::UndefinedVariable(path));
        }
        if value.is_undefined() {
            return Err(undefined(None));
        }
        serde_json::to_value(&value).map_err(|e| ExpressionError::Evaluation(e.to_string()))
    }
}

fn resolves(ctx: &Context, path: &str) -> bool {
    let mut parts = path.split('.');
    let Some(mut current) = parts.next().and_then(|root| ctx.get(root)) else {
        return false;
    };
    for part in parts {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    true
}

fn map_error(e: Error) -> ExpressionError {
    let detail = e.detail().unwrap_or_default().to_string();
    match e.kind() {
        ErrorKind::SyntaxError => ExpressionError::Syntax(e.to_string()),
        ErrorKind::UnknownFunction
        | ErrorKind::UnknownMethod
        | ErrorKind::UnknownFilter
        | ErrorKind::UnknownTest => {
            let name = detail
                .trim_end_matches(" is unknown")
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_string();
            ExpressionError::ForbiddenFunction(name)
        }
        ErrorKind::UndefinedError => ExpressionError::UndefinedVariable(detail),
        _ if detail.is_empty() => ExpressionError::Evaluation(e.to_string()),
        _ => ExpressionError::Evaluation(detail),
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Compile and evaluate `src`, returning the resulting value.
pub fn evaluate(src: &str, ctx: &Context) -> Result<Json, ExpressionError> {
    Compiled::new(src)?.eval(src, ctx)
}

/// Compile and evaluate `src` as a condition.
///
/// A condition written as a single template token (`"{{ ready }}"`) is
/// accepted and treated as the bare expression inside it.
pub fn evaluate_condition(src: &str, ctx: &Context) -> Result<bool, ExpressionError> {
    let value = evaluate(strip_template_braces(src), ctx)?;
    Ok(is_truthy(&value))
}

/// Check that `src` compiles and calls only allowed functions.
pub fn check(src: &str) -> Result<(), ExpressionError> {
    Compiled::new(strip_template_braces(src)).map(|_| ())
}

/// Root variable names an expression reads.
pub fn references(src: &str) -> Result<BTreeSet<String>, ExpressionError> {
    Ok(Compiled::new(strip_template_braces(src))?.references())
}

pub(crate) fn strip_template_braces(src: &str) -> &str {
    let trimmed = src.trim();
    if let Some(inner) = trimmed
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
    {
        if !inner.contains("{{") && !inner.contains("}}") {
            return inner;
        }
    }
    src
}

// ---------------------------------------------------------------------------
// Value semantics
// ---------------------------------------------------------------------------

pub fn is_truthy(value: &Json) -> bool {
    match value {
        Json::Null => false,
        Json::Bool(b) => *b,
        Json::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Json::String(s) => !s.is_empty(),
        Json::Array(a) => !a.is_empty(),
        Json::Object(o) => !o.is_empty(),
    }
}

/// String form used when a value is interpolated into surrounding text.
pub fn display_string(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        let mut ctx = Context::new();
        ctx.set("rows", json!([{"id": 1}, {"id": 2}]));
        ctx.set("result", json!({"rows": 2, "status": "ok", "tags": ["a", "b"]}));
        ctx.set("name", json!("Ada"));
        ctx.set("empty", json!([]));
        ctx.set("zero", json!(0));
        ctx
    }

    #[test]
    fn test_condition_comparisons() {
        let c = ctx();
        assert!(evaluate_condition("result.rows == 2", &c).unwrap());
        assert!(evaluate_condition("result.rows >= 2 and name == 'Ada'", &c).unwrap());
        assert!(!evaluate_condition("result.rows > 2", &c).unwrap());
        assert!(evaluate_condition("result.status != 'failed'", &c).unwrap());
        assert!(evaluate_condition("2 == 2.0", &c).unwrap());
    }

    #[test]
    fn test_condition_count_function() {
        let c = ctx();
        assert!(evaluate_condition("count(rows) == 2", &c).unwrap());
        assert!(evaluate_condition("count(result) == 3", &c).unwrap());
        assert!(evaluate_condition("len(name) == 3 and lower(name) == 'ada'", &c).unwrap());
    }

    #[test]
    fn test_condition_membership() {
        let c = ctx();
        assert!(evaluate_condition("'a' in result.tags", &c).unwrap());
        assert!(evaluate_condition("'z' not in result.tags", &c).unwrap());
        assert!(evaluate_condition("'rows' in result", &c).unwrap());
        assert!(evaluate_condition("'Ad' in name", &c).unwrap());
    }

    #[test]
    fn test_truthiness_of_collections_and_zero() {
        let c = ctx();
        assert!(!evaluate_condition("empty", &c).unwrap());
        assert!(!evaluate_condition("zero", &c).unwrap());
        assert!(evaluate_condition("rows", &c).unwrap());
        assert!(evaluate_condition("not empty", &c).unwrap());
        assert!(!evaluate_condition("null", &c).unwrap());
        assert!(!evaluate_condition("none", &c).unwrap());
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let c = ctx();
        assert_eq!(
            evaluate_condition("missing == 1", &c).unwrap_err(),
            ExpressionError::UndefinedVariable("missing".into())
        );
        assert_eq!(
            evaluate("result.nope", &c).unwrap_err(),
            ExpressionError::UndefinedVariable("result.nope".into())
        );
        assert!(evaluate("rows[5]", &c).unwrap_err().is_undefined_variable());
    }

    #[test]
    fn test_untaken_branch_still_needs_its_variables() {
        let c = ctx();
        assert_eq!(
            evaluate_condition("empty and missing", &c).unwrap_err(),
            ExpressionError::UndefinedVariable("missing".into())
        );
    }

    #[test]
    fn test_forbidden_calls_are_rejected() {
        let c = ctx();
        assert_eq!(
            evaluate_condition("__import__('os')", &c).unwrap_err(),
            ExpressionError::ForbiddenFunction("__import__".into())
        );
        assert!(matches!(
            evaluate("name.upper()", &c),
            Err(ExpressionError::ForbiddenFunction(_))
        ));
        assert!(matches!(
            evaluate("name | upper", &c),
            Err(ExpressionError::ForbiddenFunction(_))
        ));
        assert!(matches!(
            evaluate("range(3)", &c),
            Err(ExpressionError::ForbiddenFunction(_))
        ));
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(evaluate("url ==", &ctx()), Err(ExpressionError::Syntax(_))));
        assert!(matches!(check("(a"), Err(ExpressionError::Syntax(_))));
    }

    #[test]
    fn test_indexing() {
        let c = ctx();
        assert_eq!(evaluate("rows[0].id", &c).unwrap(), json!(1));
        assert_eq!(evaluate("result['status']", &c).unwrap(), json!("ok"));
    }

    #[test]
    fn test_arithmetic() {
        let c = ctx();
        assert_eq!(evaluate("result.rows * 3 + 1", &c).unwrap(), json!(7));
        assert_eq!(evaluate("7 % 3", &c).unwrap(), json!(1));
        assert_eq!(evaluate("1 / 4", &c).unwrap(), json!(0.25));
        assert_eq!(evaluate("'a' ~ 'b'", &c).unwrap(), json!("ab"));
        assert_eq!(evaluate("-result.rows", &c).unwrap(), json!(-2));
        assert!(matches!(evaluate("1 / 0", &c), Err(ExpressionError::Evaluation(_))));
    }

    #[test]
    fn test_function_type_errors_surface() {
        let c = ctx();
        let err = evaluate("count(zero)", &c).unwrap_err();
        assert!(matches!(err, ExpressionError::Evaluation(ref m) if m.contains("count()")));
    }

    #[test]
    fn test_condition_in_template_braces() {
        let c = ctx();
        assert!(evaluate_condition("{{ result.rows == 2 }}", &c).unwrap());
    }

    #[test]
    fn test_references_skip_function_names() {
        let refs = references("count(parsed) > limit and null == x.y").unwrap();
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec!["limit", "parsed", "x"]);
    }

    #[test]
    fn test_variable_named_like_a_function() {
        let mut c = ctx();
        c.set("count", json!(3));
        assert_eq!(evaluate("count + 1", &c).unwrap(), json!(4));
    }

    #[test]
    fn test_evaluation_does_not_mutate_context() {
        let c = ctx();
        let before = c.clone();
        let _ = evaluate("rows[0].id + count(result)", &c).unwrap();
        assert_eq!(c, before);
    }
}
