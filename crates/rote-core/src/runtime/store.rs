//! Run state persistence port.
//!
//! Suspended runs live in a `StateStore` keyed by `run_id` so that a resume
//! can happen in a different process than the one that paused the run.

use std::future::Future;

use dashmap::DashMap;

use rote_types::error::StoreError;
use rote_types::run::{RunState, RunStatus};

/// Durable storage for suspended runs.
///
/// Uses RPITIT (return-position `impl Trait` in traits) for async methods.
pub trait StateStore: Send + Sync {
    /// Insert or replace the state for `state.run_id`.
    fn save(&self, state: &RunState) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load(&self, run_id: &str)
    -> impl Future<Output = Result<Option<RunState>, StoreError>> + Send;

    /// Remove a run. Returns `false` when nothing was stored under `run_id`.
    fn delete(&self, run_id: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Runs waiting for input, oldest first.
    fn list_pending(&self) -> impl Future<Output = Result<Vec<RunState>, StoreError>> + Send;
}

/// Process-local store, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    states: DashMap<String, RunState>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl StateStore for InMemoryStateStore {
    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        self.states.insert(state.run_id.clone(), state.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        Ok(self.states.get(run_id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, run_id: &str) -> Result<bool, StoreError> {
        Ok(self.states.remove(run_id).is_some())
    }

    async fn list_pending(&self) -> Result<Vec<RunState>, StoreError> {
        let mut pending: Vec<RunState> = self
            .states
            .iter()
            .filter(|entry| entry.status == RunStatus::NeedsInput)
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(pending)
    }
}
