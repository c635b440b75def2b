//! SQLite run state store.
//!
//! Implements `StateStore` from `rote-core`. The context is stored as a JSON
//! blob; everything the engine filters on has its own column.

use chrono::{DateTime, Utc};
use sqlx::Row;

use rote_core::runtime::StateStore;
use rote_types::context::Context;
use rote_types::error::StoreError;
use rote_types::run::{RoutineRef, RunState, RunStatus};

use super::pool::DatabasePool;

/// SQLite-backed implementation of `StateStore`.
#[derive(Clone)]
pub struct SqliteStateStore {
    pool: DatabasePool,
}

impl SqliteStateStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct RunStateRow {
    run_id: String,
    routine_name: String,
    routine_version: String,
    routine_digest: String,
    location: Option<String>,
    context: String,
    pc: i64,
    status: String,
    pending_prompt: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RunStateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_id: row.try_get("run_id")?,
            routine_name: row.try_get("routine_name")?,
            routine_version: row.try_get("routine_version")?,
            routine_digest: row.try_get("routine_digest")?,
            location: row.try_get("location")?,
            context: row.try_get("context")?,
            pc: row.try_get("pc")?,
            status: row.try_get("status")?,
            pending_prompt: row.try_get("pending_prompt")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_state(self) -> Result<RunState, StoreError> {
        let context: Context = serde_json::from_str(&self.context)
            .map_err(|e| StoreError::Serialization(format!("invalid context JSON: {e}")))?;
        let status: RunStatus =
            serde_json::from_value(serde_json::Value::String(self.status.clone()))
                .map_err(|_| StoreError::Query(format!("invalid run status: {}", self.status)))?;
        let pc = usize::try_from(self.pc)
            .map_err(|_| StoreError::Query(format!("invalid pc: {}", self.pc)))?;

        Ok(RunState {
            run_id: self.run_id,
            routine: RoutineRef {
                name: self.routine_name,
                version: self.routine_version,
                digest: self.routine_digest,
                location: self.location,
            },
            context,
            pc,
            status,
            pending_prompt: self.pending_prompt,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Query(format!("invalid datetime: {e}")))
}

// ---------------------------------------------------------------------------
// StateStore implementation
// ---------------------------------------------------------------------------

impl StateStore for SqliteStateStore {
    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let context = serde_json::to_string(&state.context)?;

        sqlx::query(
            r#"INSERT INTO run_states
                   (run_id, routine_name, routine_version, routine_digest, location,
                    context, pc, status, pending_prompt, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (run_id) DO UPDATE SET
                   context = excluded.context,
                   pc = excluded.pc,
                   status = excluded.status,
                   pending_prompt = excluded.pending_prompt,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&state.run_id)
        .bind(&state.routine.name)
        .bind(&state.routine.version)
        .bind(&state.routine.digest)
        .bind(&state.routine.location)
        .bind(&context)
        .bind(state.pc as i64)
        .bind(state.status.to_string())
        .bind(&state.pending_prompt)
        .bind(state.created_at.to_rfc3339())
        .bind(state.updated_at.to_rfc3339())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        tracing::debug!(run_id = %state.run_id, status = %state.status, pc = state.pc, "saved run state");
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        let row = sqlx::query("SELECT * FROM run_states WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let row = RunStateRow::from_row(&row).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(row.into_state()?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, run_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM run_states WHERE run_id = ?")
            .bind(run_id)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_pending(&self) -> Result<Vec<RunState>, StoreError> {
        let rows = sqlx::query("SELECT * FROM run_states WHERE status = ? ORDER BY created_at, run_id")
            .bind(RunStatus::NeedsInput.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                RunStateRow::from_row(row)
                    .map_err(|e| StoreError::Query(e.to_string()))?
                    .into_state()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, SqliteStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let pool = DatabasePool::new(&url).await.unwrap();
        (dir, SqliteStateStore::new(pool))
    }

    fn suspended(run_id: &str) -> RunState {
        let mut ctx = Context::new();
        ctx.set("url", json!("fixture://demo.csv"));
        ctx.set("raw", json!({"rows": 2}));
        let mut state = RunState::start(
            run_id,
            RoutineRef {
                name: "demo".into(),
                version: "1".into(),
                digest: "d1".into(),
                location: Some("/tmp/pkg".into()),
            },
            ctx,
        );
        state.pc = 2;
        state.status = RunStatus::NeedsInput;
        state.pending_prompt = Some("s3".into());
        state
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (_dir, store) = test_store().await;
        let state = suspended("run-1");
        store.save(&state).await.unwrap();

        let loaded = store.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.routine, state.routine);
        assert_eq!(loaded.context, state.context);
        assert_eq!(loaded.pc, 2);
        assert_eq!(loaded.status, RunStatus::NeedsInput);
        assert_eq!(loaded.pending_prompt.as_deref(), Some("s3"));
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let (_dir, store) = test_store().await;
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let (_dir, store) = test_store().await;
        let mut state = suspended("run-1");
        store.save(&state).await.unwrap();

        state.pc = 4;
        state.context.set("extra", json!(true));
        store.save(&state).await.unwrap();

        let loaded = store.load("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.pc, 4);
        assert_eq!(loaded.context.get("extra"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn test_delete_reports_presence() {
        let (_dir, store) = test_store().await;
        store.save(&suspended("run-1")).await.unwrap();

        assert!(store.delete("run-1").await.unwrap());
        assert!(!store.delete("run-1").await.unwrap());
        assert!(store.load("run-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_pending_filters_status() {
        let (_dir, store) = test_store().await;
        store.save(&suspended("run-1")).await.unwrap();
        let mut running = suspended("run-2");
        running.status = RunStatus::Running;
        running.pending_prompt = None;
        store.save(&running).await.unwrap();

        let pending = store.list_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].run_id, "run-1");
    }
}
