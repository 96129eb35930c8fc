//! Catalog connection.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
// One writer (the engine's commit buffer), a handful of readers.
const MAX_CONNECTIONS: u32 = 4;

/// Pool over the placement catalog. Repositories are created from it with
/// `From<&Database>`.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn new(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(Self { pool })
    }

    /// Open the catalog file at `path`, creating it and its parent directory
    /// on first use. Migrations run on every connect.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Database)?;
        }
        let options = Self::options().filename(path).create_if_missing(true);
        Self::new(options, MAX_CONNECTIONS).await
    }

    /// A fresh in-memory catalog.
    ///
    /// Not `#[cfg(test)]`: other crates seed it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        // Every connection to ":memory:" sees its own database.
        Self::new(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // Placements must never reference a missing backend or file.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            // A commit flush of a thousand rows can hold the write lock for
            // a while; reports wait instead of failing.
            .busy_timeout(Duration::from_secs(5))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_placements_require_known_backend() {
        let db = Database::connect_in_memory().await.unwrap();
        let orphan = sqlx::query(
            "INSERT INTO mm_files_image_storage (file_id, storage_id, representation_type, updated_at) VALUES (1, 99, 0, 0)",
        )
        .execute(db.pool())
        .await;
        assert!(orphan.is_err());
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_creates_catalog_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("state").join("catalog.sqlite");
        let db = Database::connect(&path).await.unwrap();
        db.close().await;
        assert!(path.is_file());

        // Reopening an existing catalog applies no migration twice.
        let db = Database::connect(&path).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM storage_backend").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 0);
        db.close().await;
    }
}
