//! Repository for placement rows.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{MediaType, Placement, PlacementRow, Representation};
use exn::ResultExt;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

/// Rows per multi-value INSERT; keeps each statement well under SQLite's
/// bound parameter limit.
const INSERT_CHUNK_SIZE: usize = 500;

/// Catalog change for one successfully rescaled image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescaleUpdate {
    /// In-place rescale: `(file, storage, original)` becomes `(file, storage, scaled)`.
    Promote { file_id: i64, storage_id: i64 },
    /// Cross-backend rescale: add `(file, storage, scaled)`.
    Add { file_id: i64, storage_id: i64 },
    /// Cross-backend rescale with removal of the original:
    /// `(file, from, original)` becomes `(file, to, scaled)`.
    Move { file_id: i64, from: i64, to: i64 },
}

/// Repository for placement rows of both media types.
#[derive(Debug, Clone)]
pub struct PlacementRepository {
    pool: SqlitePool,
}
impl From<&Database> for PlacementRepository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl PlacementRepository {
    /// Bulk-insert placements of `file_ids` on `storage_id` in one
    /// transaction. Rows that already exist are left untouched.
    ///
    /// Returns the number of rows actually inserted. Any failure is a
    /// [`CatalogCommit`](ErrorKind::CatalogCommit) error and nothing is
    /// written.
    #[instrument(skip(self, file_ids), fields(files = file_ids.len()))]
    pub async fn insert(
        &self,
        media: MediaType,
        storage_id: i64,
        representation: Representation,
        file_ids: &[i64],
    ) -> Result<u64> {
        if file_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::CatalogCommit)?;
        let mut inserted = 0;
        for chunk in file_ids.chunks(INSERT_CHUNK_SIZE) {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "INSERT INTO {} (file_id, storage_id, representation_type) ",
                media.placement_table()
            ));
            builder.push_values(chunk, |mut row, file_id| {
                row.push_bind(*file_id).push_bind(storage_id).push_bind(i64::from(representation));
            });
            builder.push(" ON CONFLICT DO NOTHING");
            let result = builder.build().execute(&mut *tx).await.or_raise(|| ErrorKind::CatalogCommit)?;
            inserted += result.rows_affected();
        }
        tx.commit().await.or_raise(|| ErrorKind::CatalogCommit)?;
        Ok(inserted)
    }

    /// Apply rescale placement changes (images only) in one transaction.
    ///
    /// Returns the number of rows changed.
    #[instrument(skip(self, updates), fields(updates = updates.len()))]
    pub async fn apply_rescale(&self, updates: &[RescaleUpdate]) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::CatalogCommit)?;
        let mut changed = 0;
        for update in updates {
            let query = match *update {
                RescaleUpdate::Promote { file_id, storage_id } => {
                    sqlx::query(include_str!("../../queries/promote_image.sql")).bind(file_id).bind(storage_id)
                },
                RescaleUpdate::Add { file_id, storage_id } => {
                    sqlx::query(include_str!("../../queries/add_scaled_image.sql")).bind(file_id).bind(storage_id)
                },
                RescaleUpdate::Move { file_id, from, to } => {
                    sqlx::query(include_str!("../../queries/move_image.sql")).bind(file_id).bind(from).bind(to)
                },
            };
            let result = query.execute(&mut *tx).await.or_raise(|| ErrorKind::CatalogCommit)?;
            changed += result.rows_affected();
        }
        tx.commit().await.or_raise(|| ErrorKind::CatalogCommit)?;
        Ok(changed)
    }

    /// Number of placements of one representation on a backend.
    pub async fn count(&self, media: MediaType, storage_id: i64, representation: Representation) -> Result<u64> {
        let query = match media {
            MediaType::Image => include_str!("../../queries/count_placements_image.sql"),
            MediaType::Audio => include_str!("../../queries/count_placements_audio.sql"),
        };
        let (count,): (i64,) = sqlx::query_as(query)
            .bind(storage_id)
            .bind(i64::from(representation))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("placement count"))
    }

    /// Every placement of one object.
    pub async fn for_file(&self, media: MediaType, file_id: i64) -> Result<Vec<Placement>> {
        let query = match media {
            MediaType::Image => include_str!("../../queries/placements_image.sql"),
            MediaType::Audio => include_str!("../../queries/placements_audio.sql"),
        };
        let rows: Vec<PlacementRow> = sqlx::query_as(query)
            .bind(file_id)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Placement::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixtures;
    use Representation::{Original, Scaled};

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let backend = fx.backend("/mnt/a").await;
        let deployment = fx.deployment("d1", None).await;
        let files = [fx.image(deployment, "a.jpg").await, fx.image(deployment, "b.jpg").await];
        let repo = PlacementRepository::from(&db);
        assert_eq!(repo.insert(MediaType::Image, backend, Original, &files).await.unwrap(), 2);
        assert_eq!(repo.insert(MediaType::Image, backend, Original, &files).await.unwrap(), 0);
        assert_eq!(repo.count(MediaType::Image, backend, Original).await.unwrap(), 2);
        assert_eq!(repo.count(MediaType::Audio, backend, Original).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_spans_chunks() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let backend = fx.backend("/mnt/a").await;
        let deployment = fx.deployment("d1", None).await;
        let mut files = Vec::new();
        for i in 0..(INSERT_CHUNK_SIZE + 7) {
            files.push(fx.audio(deployment, &format!("rec-{i}.wav")).await);
        }
        let repo = PlacementRepository::from(&db);
        let inserted = repo.insert(MediaType::Audio, backend, Original, &files).await.unwrap();
        assert_eq!(inserted, files.len() as u64);
    }

    #[tokio::test]
    async fn test_insert_failure_writes_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let backend = fx.backend("/mnt/a").await;
        let deployment = fx.deployment("d1", None).await;
        let file = fx.image(deployment, "a.jpg").await;
        let repo = PlacementRepository::from(&db);
        // 424242 violates the foreign key on files_image.
        let err = repo.insert(MediaType::Image, backend, Original, &[file, 424242]).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CatalogCommit));
        assert_eq!(repo.count(MediaType::Image, backend, Original).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_apply_rescale() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let source = fx.backend("/mnt/source").await;
        let target = fx.backend("/mnt/target").await;
        let deployment = fx.deployment("d1", None).await;
        let in_place = fx.image(deployment, "in-place.jpg").await;
        let added = fx.image(deployment, "added.jpg").await;
        let moved = fx.image(deployment, "moved.jpg").await;
        let repo = PlacementRepository::from(&db);
        repo.insert(MediaType::Image, source, Original, &[in_place, added, moved]).await.unwrap();

        let changed = repo
            .apply_rescale(&[
                RescaleUpdate::Promote { file_id: in_place, storage_id: source },
                RescaleUpdate::Add { file_id: added, storage_id: target },
                RescaleUpdate::Move { file_id: moved, from: source, to: target },
            ])
            .await
            .unwrap();
        assert_eq!(changed, 3);

        let reps = |placements: Vec<Placement>| -> Vec<(i64, Representation)> {
            placements.into_iter().map(|p| (p.storage_id, p.representation)).collect()
        };
        assert_eq!(reps(repo.for_file(MediaType::Image, in_place).await.unwrap()), vec![(source, Scaled)]);
        assert_eq!(
            reps(repo.for_file(MediaType::Image, added).await.unwrap()),
            vec![(source, Original), (target, Scaled)]
        );
        assert_eq!(reps(repo.for_file(MediaType::Image, moved).await.unwrap()), vec![(target, Scaled)]);
    }

    #[tokio::test]
    async fn test_promote_over_existing_scaled_row() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let backend = fx.backend("/mnt/a").await;
        let deployment = fx.deployment("d1", None).await;
        let file = fx.image(deployment, "a.jpg").await;
        let repo = PlacementRepository::from(&db);
        repo.insert(MediaType::Image, backend, Original, &[file]).await.unwrap();
        repo.insert(MediaType::Image, backend, Scaled, &[file]).await.unwrap();
        repo.apply_rescale(&[RescaleUpdate::Promote { file_id: file, storage_id: backend }]).await.unwrap();
        let placements = repo.for_file(MediaType::Image, file).await.unwrap();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].representation, Scaled);
    }
}
