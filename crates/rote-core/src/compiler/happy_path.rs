//! Pluggable happy-path extraction.

use std::future::Future;

use thiserror::Error;

use rote_types::routine::Routine;
use rote_types::trace::Trace;

/// A routine produced by an extractor, with implemented UDF bodies.
#[derive(Debug, Clone)]
pub struct ExtractedRoutine {
    pub routine: Routine,
    /// Script source implementing every `udf.call` function.
    pub udf_source: String,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extractor unavailable: {0}")]
    Unavailable(String),

    #[error("extractor request failed: {0}")]
    Request(String),

    #[error("could not parse extractor output: {0}")]
    Parse(String),
}

/// Turns a messy trace into a pruned routine.
///
/// Errors are never fatal to a compile: the compiler falls back to the
/// deterministic transform whenever this returns `Err`.
pub trait HappyPathExtractor: Send + Sync {
    fn extract(
        &self,
        trace: &Trace,
    ) -> impl Future<Output = Result<ExtractedRoutine, ExtractError>> + Send;
}
