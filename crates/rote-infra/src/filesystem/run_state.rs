//! File-backed run state store: `{data_dir}/runs/{run_id}.json`.

use std::path::{Path, PathBuf};

use rote_core::runtime::StateStore;
use rote_types::error::StoreError;
use rote_types::run::{RunState, RunStatus};

use super::{runs_dir, write_atomic};

/// One pretty-printed JSON file per run.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Store runs under `{data_dir}/runs/`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: runs_dir(data_dir),
        }
    }

    fn path_for(&self, run_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Query(format!("invalid run id: {run_id:?}")));
        }
        Ok(self.dir.join(format!("{run_id}.json")))
    }

    async fn read_state(path: &Path) -> Result<Option<RunState>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", path.display()))),
        }
    }
}

impl StateStore for FileStateStore {
    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let path = self.path_for(&state.run_id)?;
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&path, &json)
            .await
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
        tracing::debug!(run_id = %state.run_id, path = %path.display(), "saved run state");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        let path = self.path_for(run_id)?;
        Self::read_state(&path).await
    }

    async fn delete(&self, run_id: &str) -> Result<bool, StoreError> {
        let path = self.path_for(run_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!("{}: {e}", path.display()))),
        }
    }

    async fn list_pending(&self) -> Result<Vec<RunState>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(format!("{}: {e}", self.dir.display()))),
        };

        let mut pending = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_state(&path).await {
                Ok(Some(state)) if state.status == RunStatus::NeedsInput => pending.push(state),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable run state");
                }
            }
        }

        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(pending)
    }
}
