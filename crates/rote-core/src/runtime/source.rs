//! Routine handles and the port that reopens them on resume.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use thiserror::Error;

use rote_types::routine::Routine;
use rote_types::run::RoutineRef;

use super::udf::UdfModule;
use crate::compiler::fixtures::canonical_json;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("routine not found: {0}")]
    NotFound(String),

    #[error("failed to load routine: {0}")]
    Load(String),
}

/// A loaded routine paired with its UDF module.
#[derive(Clone)]
pub struct RoutineHandle {
    pub routine: Arc<Routine>,
    pub udfs: Arc<dyn UdfModule>,
    pub reference: RoutineRef,
}

impl RoutineHandle {
    /// Wrap a routine, computing its digest.
    pub fn new(routine: Routine, udfs: Arc<dyn UdfModule>, location: Option<String>) -> Self {
        let reference = RoutineRef {
            name: routine.name.clone(),
            version: routine.version.clone(),
            digest: routine_digest(&routine),
            location,
        };
        Self {
            routine: Arc::new(routine),
            udfs,
            reference,
        }
    }
}

impl std::fmt::Debug for RoutineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutineHandle")
            .field("reference", &self.reference)
            .field("steps", &self.routine.steps.len())
            .finish()
    }
}

/// SHA-256 (hex) of the routine's canonical JSON.
pub fn routine_digest(routine: &Routine) -> String {
    let canonical = serde_json::to_value(routine)
        .map(|v| canonical_json(&v))
        .unwrap_or_default();
    Sha256::digest(canonical.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Reopens the routine a suspended run belongs to.
pub trait RoutineSource: Send + Sync {
    fn open(
        &self,
        reference: &RoutineRef,
    ) -> impl Future<Output = Result<RoutineHandle, SourceError>> + Send;
}

/// In-memory source keyed by routine name.
#[derive(Debug, Default)]
pub struct StaticRoutineSource {
    handles: DashMap<String, RoutineHandle>,
}

impl StaticRoutineSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` available; replaces any routine with the same name.
    pub fn insert(&self, handle: RoutineHandle) {
        self.handles.insert(handle.reference.name.clone(), handle);
    }
}

impl RoutineSource for StaticRoutineSource {
    async fn open(&self, reference: &RoutineRef) -> Result<RoutineHandle, SourceError> {
        self.handles
            .get(&reference.name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SourceError::NotFound(reference.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::udf::NativeUdfModule;
    use rote_types::routine::{Step, StepKind};
    use serde_json::json;

    fn routine(value: serde_json::Value) -> Routine {
        Routine {
            version: "1".into(),
            name: "demo".into(),
            description: None,
            tools: Default::default(),
            input_schema: None,
            output_schema: None,
            steps: vec![Step::new("out", StepKind::Return { value })],
        }
    }

    #[test]
    fn test_digest_is_stable_and_sensitive() {
        let a = routine_digest(&routine(json!({"a": 1, "b": 2})));
        let b = routine_digest(&routine(json!({"b": 2, "a": 1})));
        let c = routine_digest(&routine(json!({"a": 1, "b": 3})));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn test_static_source_open() {
        let source = StaticRoutineSource::new();
        let handle = RoutineHandle::new(routine(json!(1)), Arc::new(NativeUdfModule::new()), None);
        let reference = handle.reference.clone();
        source.insert(handle);

        let opened = source.open(&reference).await.unwrap();
        assert_eq!(opened.reference, reference);

        let missing = RoutineRef {
            name: "other".into(),
            ..reference
        };
        assert!(matches!(source.open(&missing).await, Err(SourceError::NotFound(_))));
    }
}
