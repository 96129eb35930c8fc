//! Repository for storage backend records.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{BackendRecord, BackendRow, NewBackend};
use exn::ResultExt;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::instrument;

/// Repository for managing storage backend records.
///
/// Records are immutable once created apart from their notes, and are never
/// deleted (placements reference them).
#[derive(Debug, Clone)]
pub struct BackendRepository {
    pool: SqlitePool,
}
impl From<&Database> for BackendRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

/// A backend record inserted inside an open transaction.
///
/// The record (including its catalog-assigned `storage_id` and `created_at`)
/// is visible to the caller, but not to anyone else, until
/// [`commit()`](Self::commit). Dropping it rolls the insert back.
pub struct PendingBackend {
    tx: Transaction<'static, Sqlite>,
    record: BackendRecord,
}
impl std::fmt::Debug for PendingBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingBackend").field("record", &self.record).finish_non_exhaustive()
    }
}
impl PendingBackend {
    pub fn record(&self) -> &BackendRecord {
        &self.record
    }

    pub async fn commit(self) -> Result<BackendRecord> {
        self.tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(self.record)
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await.or_raise(|| ErrorKind::Database)
    }
}

impl BackendRepository {
    /// Insert a backend record and return it without committing.
    #[instrument(skip(self), fields(kind = %backend.kind, location = %backend.location))]
    pub async fn insert_pending(&self, backend: &NewBackend) -> Result<PendingBackend> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let row: BackendRow = sqlx::query_as(include_str!("../../queries/insert_backend.sql"))
            .bind(backend.kind.as_str())
            .bind(&backend.location)
            .bind(backend.priority)
            .bind(&backend.notes)
            .bind(&backend.device_label)
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let record = BackendRecord::try_from(row)?;
        tracing::debug!(storage_id = record.storage_id, "backend record inserted, pending commit");
        Ok(PendingBackend { tx, record })
    }

    /// Insert a backend record and commit immediately.
    pub async fn insert(&self, backend: &NewBackend) -> Result<BackendRecord> {
        self.insert_pending(backend).await?.commit().await
    }

    pub async fn get(&self, storage_id: i64) -> Result<Option<BackendRecord>> {
        let row: Option<BackendRow> = sqlx::query_as(include_str!("../../queries/get_backend.sql"))
            .bind(storage_id)
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(BackendRecord::try_from).transpose()
    }

    /// Every backend, ordered by priority then storage id.
    pub async fn list(&self) -> Result<Vec<BackendRecord>> {
        let rows: Vec<BackendRow> = sqlx::query_as(include_str!("../../queries/list_backends.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(BackendRecord::try_from).collect()
    }

    /// Replace the notes of a backend; the only mutation a record allows.
    #[instrument(skip(self, notes))]
    pub async fn set_notes(&self, storage_id: i64, notes: &str) -> Result<()> {
        let result = sqlx::query(include_str!("../../queries/set_backend_notes.sql"))
            .bind(storage_id)
            .bind(notes)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::BackendNotFound(storage_id));
        }
        Ok(())
    }
}
