//! Backend selection for run state.

use std::path::Path;

use rote_core::runtime::StateStore;
use rote_types::config::{StateBackend, StateConfig};
use rote_types::error::StoreError;
use rote_types::run::RunState;

use crate::filesystem::run_state::FileStateStore;
use crate::sqlite::pool::{DatabasePool, database_url};
use crate::sqlite::run_state::SqliteStateStore;

/// The configured `StateStore`, chosen at startup.
#[derive(Clone)]
pub enum AnyStateStore {
    Sqlite(SqliteStateStore),
    File(FileStateStore),
}

impl AnyStateStore {
    /// Open the backend named in `[state]` under `data_dir`.
    pub async fn open(config: &StateConfig, data_dir: &Path) -> Result<Self, StoreError> {
        match config.backend {
            StateBackend::Sqlite => {
                tokio::fs::create_dir_all(data_dir)
                    .await
                    .map_err(|e| StoreError::Io(format!("{}: {e}", data_dir.display())))?;
                let pool = DatabasePool::new(&database_url(data_dir))
                    .await
                    .map_err(|e| StoreError::Connection(e.to_string()))?;
                Ok(AnyStateStore::Sqlite(SqliteStateStore::new(pool)))
            }
            StateBackend::File => Ok(AnyStateStore::File(FileStateStore::new(data_dir))),
        }
    }

    pub fn backend(&self) -> StateBackend {
        match self {
            AnyStateStore::Sqlite(_) => StateBackend::Sqlite,
            AnyStateStore::File(_) => StateBackend::File,
        }
    }
}

impl StateStore for AnyStateStore {
    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        match self {
            AnyStateStore::Sqlite(s) => s.save(state).await,
            AnyStateStore::File(s) => s.save(state).await,
        }
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        match self {
            AnyStateStore::Sqlite(s) => s.load(run_id).await,
            AnyStateStore::File(s) => s.load(run_id).await,
        }
    }

    async fn delete(&self, run_id: &str) -> Result<bool, StoreError> {
        match self {
            AnyStateStore::Sqlite(s) => s.delete(run_id).await,
            AnyStateStore::File(s) => s.delete(run_id).await,
        }
    }

    async fn list_pending(&self) -> Result<Vec<RunState>, StoreError> {
        match self {
            AnyStateStore::Sqlite(s) => s.list_pending().await,
            AnyStateStore::File(s) => s.list_pending().await,
        }
    }
}
