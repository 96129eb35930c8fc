//! Batch definitions.
//!
//! A batch is a named selection of objects to copy from a source backend to
//! a target backend. Every selection excludes objects that already have an
//! original placement on the target, so re-running a batch after an
//! interruption only picks up what is left.
//!
//! Batches are static: adding one is a code change, not a schema change.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{Candidate, CandidateRow, MediaType};
use exn::{OptionExt, ResultExt};
use tracing::instrument;

/// A static object selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub id: u32,
    pub media_type: MediaType,
    /// Kind of backend the batch is meant to fill.
    pub target_label: &'static str,
    pub description: &'static str,
    /// SQL taking `?1 = source storage id`, `?2 = target storage id` and
    /// returning `(file_id, object_name, byte_size)` in transfer order.
    selection: &'static str,
}

pub static BATCHES: &[Batch] = &[
    Batch {
        id: 1,
        media_type: MediaType::Image,
        target_label: "archive",
        description: "all original images on the source",
        selection: include_str!("../queries/batch_image_all.sql"),
    },
    Batch {
        id: 2,
        media_type: MediaType::Audio,
        target_label: "archive",
        description: "all original audio recordings on the source",
        selection: include_str!("../queries/batch_audio_all.sql"),
    },
    Batch {
        id: 3,
        media_type: MediaType::Image,
        target_label: "cold-archive",
        description: "images from finished deployments",
        selection: include_str!("../queries/batch_image_finished.sql"),
    },
    Batch {
        id: 4,
        media_type: MediaType::Audio,
        target_label: "cold-archive",
        description: "audio from finished deployments",
        selection: include_str!("../queries/batch_audio_finished.sql"),
    },
];

/// Look up a batch by id.
pub fn find(id: u32) -> Result<&'static Batch> {
    BATCHES.iter().find(|batch| batch.id == id).ok_or_raise(|| ErrorKind::BatchNotFound(id))
}

impl Batch {
    /// Objects on `source_id` not yet placed on `target_id`, in transfer
    /// order (deployment, capture time, file id).
    #[instrument(skip(self, db), fields(batch = self.id))]
    pub async fn candidates(&self, db: &Database, source_id: i64, target_id: i64) -> Result<Vec<Candidate>> {
        let rows: Vec<CandidateRow> = sqlx::query_as(self.selection)
            .bind(source_id)
            .bind(target_id)
            .fetch_all(db.pool())
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Candidate::try_from).collect()
    }
}

/// Original images of one deployment on `source_id` that have no scaled
/// placement on `target_id` yet.
#[instrument(skip(db))]
pub async fn rescale_candidates(
    db: &Database,
    source_id: i64,
    target_id: i64,
    deployment_id: i64,
) -> Result<Vec<Candidate>> {
    let rows: Vec<CandidateRow> = sqlx::query_as(include_str!("../queries/rescale_candidates.sql"))
        .bind(source_id)
        .bind(target_id)
        .bind(deployment_id)
        .fetch_all(db.pool())
        .await
        .or_raise(|| ErrorKind::Database)?;
    rows.into_iter().map(Candidate::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Representation::{Original, Scaled};
    use crate::fixtures::Fixtures;
    use rstest::rstest;

    fn names(candidates: &[Candidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.object_name.as_str()).collect()
    }

    #[rstest]
    #[case(1, MediaType::Image)]
    #[case(2, MediaType::Audio)]
    #[case(3, MediaType::Image)]
    #[case(4, MediaType::Audio)]
    fn test_find(#[case] id: u32, #[case] media_type: MediaType) {
        let batch = find(id).unwrap();
        assert_eq!(batch.id, id);
        assert_eq!(batch.media_type, media_type);
    }

    #[test]
    fn test_find_unknown() {
        let err = find(99).unwrap_err();
        assert!(matches!(&*err, ErrorKind::BatchNotFound(99)));
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<u32> = BATCHES.iter().map(|b| b.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), BATCHES.len());
    }

    #[tokio::test]
    async fn test_candidates_exclude_objects_on_target() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let source = fx.backend("/mnt/source").await;
        let target = fx.backend("/mnt/target").await;
        let deployment = fx.deployment("d1", None).await;
        let a = fx.image(deployment, "a.jpg").await;
        let b = fx.image(deployment, "b.jpg").await;
        let c = fx.image(deployment, "c.jpg").await;
        let elsewhere = fx.image(deployment, "elsewhere.jpg").await;
        for file in [a, b, c] {
            fx.place(MediaType::Image, file, source, Original).await;
        }
        // Not on the source at all.
        fx.place(MediaType::Image, elsewhere, target, Scaled).await;
        // Already copied.
        fx.place(MediaType::Image, b, target, Original).await;
        // A scaled copy on the target does not count as the original.
        fx.place(MediaType::Image, c, target, Scaled).await;

        let candidates = find(1).unwrap().candidates(&db, source, target).await.unwrap();
        assert_eq!(names(&candidates), vec!["a.jpg", "c.jpg"]);
        assert_eq!(candidates[0].file_id, a);
        assert_eq!(candidates[0].byte_size, 1024);
        // Audio batch sees none of the images.
        assert!(find(2).unwrap().candidates(&db, source, target).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_candidates_ordered_by_deployment_then_capture() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let source = fx.backend("/mnt/source").await;
        let target = fx.backend("/mnt/target").await;
        let first = fx.deployment("first", None).await;
        let second = fx.deployment("second", None).await;
        let files = [
            fx.audio(second, "second-1.wav").await,
            fx.audio(first, "first-1.wav").await,
            fx.audio(second, "second-2.wav").await,
            fx.audio(first, "first-2.wav").await,
        ];
        for file in files {
            fx.place(MediaType::Audio, file, source, Original).await;
        }
        let candidates = find(2).unwrap().candidates(&db, source, target).await.unwrap();
        assert_eq!(names(&candidates), vec!["first-1.wav", "first-2.wav", "second-1.wav", "second-2.wav"]);
    }

    #[tokio::test]
    async fn test_finished_deployments_only() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let source = fx.backend("/mnt/source").await;
        let target = fx.backend("/mnt/target").await;
        let finished = fx.deployment("finished", Some(1_500_000_000)).await;
        let running = fx.deployment("running", None).await;
        let future = fx.deployment("future", Some(i64::from(i32::MAX) * 4)).await;
        for (deployment, name) in [(finished, "done.jpg"), (running, "running.jpg"), (future, "future.jpg")] {
            let file = fx.image(deployment, name).await;
            fx.place(MediaType::Image, file, source, Original).await;
        }
        let candidates = find(3).unwrap().candidates(&db, source, target).await.unwrap();
        assert_eq!(names(&candidates), vec!["done.jpg"]);
    }

    #[tokio::test]
    async fn test_rescale_candidates() {
        let db = Database::connect_in_memory().await.unwrap();
        let fx = Fixtures::new(&db);
        let source = fx.backend("/mnt/source").await;
        let target = fx.backend("/mnt/target").await;
        let deployment = fx.deployment("d1", None).await;
        let other = fx.deployment("d2", None).await;
        let a = fx.image(deployment, "a.jpg").await;
        let b = fx.image(deployment, "b.jpg").await;
        let c = fx.image(other, "c.jpg").await;
        for file in [a, b, c] {
            fx.place(MediaType::Image, file, source, Original).await;
        }
        fx.place(MediaType::Image, b, target, Scaled).await;
        let candidates = rescale_candidates(&db, source, target, deployment).await.unwrap();
        assert_eq!(names(&candidates), vec!["a.jpg"]);
        // In place: nothing scaled on the source yet.
        let candidates = rescale_candidates(&db, source, source, deployment).await.unwrap();
        assert_eq!(names(&candidates), vec!["a.jpg", "b.jpg"]);
    }
}
