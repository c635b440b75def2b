//! UDF modules: the named-function table a routine's `udf.call` steps run.
//!
//! A module is resolved per routine. The engine calls it on a blocking
//! thread, so implementations may be CPU-bound and synchronous.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UdfError {
    #[error("function not found: {0}")]
    NotFound(String),

    #[error("invalid arguments for {function}: {message}")]
    InvalidArgs { function: String, message: String },

    #[error("{0}")]
    Execution(String),

    #[error("failed to load UDF module: {0}")]
    Load(String),
}

/// A table of deterministic functions called with keyword arguments.
pub trait UdfModule: Send + Sync {
    fn call(&self, function: &str, args: &Map<String, Value>) -> Result<Value, UdfError>;

    /// Names of every callable function.
    fn functions(&self) -> Vec<String>;

    fn has(&self, function: &str) -> bool {
        self.functions().iter().any(|f| f == function)
    }
}

type NativeFn = Arc<dyn Fn(&Map<String, Value>) -> Result<Value, UdfError> + Send + Sync>;

/// UDF module backed by Rust closures registered at startup.
#[derive(Clone, Default)]
pub struct NativeUdfModule {
    functions: BTreeMap<String, NativeFn>,
}

impl NativeUdfModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, UdfError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
        self
    }
}

impl UdfModule for NativeUdfModule {
    fn call(&self, function: &str, args: &Map<String, Value>) -> Result<Value, UdfError> {
        let f = self
            .functions
            .get(function)
            .ok_or_else(|| UdfError::NotFound(function.to_string()))?;
        f(args)
    }

    fn functions(&self) -> Vec<String> {
        self.functions.keys().cloned().collect()
    }
}

impl std::fmt::Debug for NativeUdfModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeUdfModule")
            .field("functions", &self.functions())
            .finish()
    }
}
