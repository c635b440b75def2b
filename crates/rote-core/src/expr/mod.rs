//! Restricted expression language for templates and conditions.
//!
//! Expressions are Jinja expressions compiled by minijinja in an environment
//! that carries only the allow-listed functions.
//!
//! - `functions` -- the allow-list of pure built-in functions
//! - `eval` -- the shared environment and evaluation against a run `Context`
//! - `template` -- `{{ ... }}` interpolation
//!
//! Nothing here performs I/O or writes to the context.

pub mod eval;
pub mod functions;
pub mod template;

use thiserror::Error;

pub use eval::{check, display_string, evaluate, evaluate_condition, is_truthy, references};
pub use template::{
    escape_literal, escape_value, is_template, resolve_args, resolve_template, resolve_value,
    template_references, value_references,
};

/// Errors produced while compiling or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("function '{0}' is not allowed")]
    ForbiddenFunction(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl ExpressionError {
    /// True for references to unset context keys.
    pub fn is_undefined_variable(&self) -> bool {
        matches!(self, ExpressionError::UndefinedVariable(_))
    }
}

/// Whether `name` can be bound in the context and read back by name.
pub fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !functions::KEYWORDS.contains(&name)
}
