//! Seed helpers for tests.
//!
//! The media tables (`files_image`, `files_audio`, `deployments`, `nodes`)
//! are filled by the wider system; tests use these helpers instead. Every
//! helper panics on failure: if test setup is wrong, then test should not
//! pass.

use crate::models::{MediaType, NewBackend, Representation};
use crate::{BackendRepository, Database, PlacementRepository};
use mediashift_storage::BackendKind;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct Fixtures {
    db: Database,
    /// Capture timestamps increase in insertion order.
    clock: AtomicI64,
}

impl Fixtures {
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone(), clock: AtomicI64::new(1_600_000_000) }
    }

    /// Insert a local backend record (priority 1, no marker on disk).
    pub async fn backend(&self, location: &str) -> i64 {
        let record = BackendRepository::from(&self.db)
            .insert(&NewBackend {
                kind: BackendKind::LocalFilesystem,
                location: location.to_string(),
                priority: 1,
                notes: String::new(),
                device_label: Some(location.to_string()),
            })
            .await;
        match record {
            Ok(record) => record.storage_id,
            Err(err) => panic!("Fixtures::backend: {err:?}"),
        }
    }

    /// Insert a deployment on its own node. `end_date` is a unix timestamp.
    pub async fn deployment(&self, name: &str, end_date: Option<i64>) -> i64 {
        let result: sqlx::Result<(i64,)> = async {
            let (node_id,): (i64,) = sqlx::query_as("INSERT INTO nodes (name) VALUES (?1) RETURNING node_id")
                .bind(format!("node-{name}"))
                .fetch_one(self.db.pool())
                .await?;
            sqlx::query_as(
                "INSERT INTO deployments (node_id, name, end_date) VALUES (?1, ?2, ?3) RETURNING deployment_id",
            )
            .bind(node_id)
            .bind(name)
            .bind(end_date)
            .fetch_one(self.db.pool())
            .await
        }
        .await;
        match result {
            Ok((deployment_id,)) => deployment_id,
            Err(err) => panic!("Fixtures::deployment: {err}"),
        }
    }

    /// Insert a media file record.
    pub async fn file(&self, media: MediaType, deployment_id: i64, object_name: &str, byte_size: u64) -> i64 {
        let table = match media {
            MediaType::Image => "files_image",
            MediaType::Audio => "files_audio",
        };
        let captured_at = self.clock.fetch_add(60, Ordering::SeqCst);
        let result: sqlx::Result<(i64,)> = sqlx::query_as(&format!(
            "INSERT INTO {table} (object_name, byte_size, deployment_id, captured_at) VALUES (?1, ?2, ?3, ?4) RETURNING file_id"
        ))
        .bind(object_name)
        .bind(byte_size as i64)
        .bind(deployment_id)
        .bind(captured_at)
        .fetch_one(self.db.pool())
        .await;
        match result {
            Ok((file_id,)) => file_id,
            Err(err) => panic!("Fixtures::file: {err}"),
        }
    }

    pub async fn image(&self, deployment_id: i64, object_name: &str) -> i64 {
        self.file(MediaType::Image, deployment_id, object_name, 1024).await
    }

    pub async fn audio(&self, deployment_id: i64, object_name: &str) -> i64 {
        self.file(MediaType::Audio, deployment_id, object_name, 4096).await
    }

    /// Record a placement.
    pub async fn place(&self, media: MediaType, file_id: i64, storage_id: i64, representation: Representation) {
        let result = PlacementRepository::from(&self.db).insert(media, storage_id, representation, &[file_id]).await;
        if let Err(err) = result {
            panic!("Fixtures::place: {err:?}");
        }
    }
}
