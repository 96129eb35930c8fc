//! Backend registry: provisioning catalog records and resolving them into
//! validated, ready-to-use storage handles.

use crate::error::{ErrorKind, Result, ValidationFailure};
use exn::{OptionExt, ResultExt};
use mediashift_catalog::{BackendRecord, BackendRepository, Database, NewBackend};
use mediashift_storage::backend::{LocalFilesystemBackend, ObjectStoreBackend, PathPrompt};
use mediashift_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use mediashift_storage::marker::{self, Marker};
use mediashift_storage::{Backend, BackendHandle, BackendKind, ObjectStoreCredentials, ObjectStoreLocation};
use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// A validated backend together with its catalog id.
#[derive(Clone)]
pub struct Endpoint {
    pub storage_id: i64,
    pub backend: BackendHandle,
}
impl Endpoint {
    pub fn new(storage_id: i64, backend: BackendHandle) -> Self {
        Self { storage_id, backend }
    }
}
impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("storage_id", &self.storage_id)
            .field("location", &self.backend.location())
            .finish()
    }
}

/// Backend registry.
///
/// Object store credentials are looked up by host when an object store
/// backend is provisioned or resolved.
#[derive(Debug, Clone)]
pub struct Registry {
    backends: BackendRepository,
    credentials: BTreeMap<String, ObjectStoreCredentials>,
}

impl Registry {
    pub fn new(db: &Database) -> Self {
        Self { backends: BackendRepository::from(db), credentials: BTreeMap::new() }
    }

    pub fn with_credentials(mut self, credentials: impl IntoIterator<Item = (String, ObjectStoreCredentials)>) -> Self {
        self.credentials.extend(credentials);
        self
    }

    /// Every backend, ordered by priority then storage id.
    pub async fn list(&self) -> Result<Vec<BackendRecord>> {
        self.backends.list().await.or_raise(|| ErrorKind::Catalog)
    }

    pub async fn get(&self, storage_id: i64) -> Result<BackendRecord> {
        let record = self.backends.get(storage_id).await.or_raise(|| ErrorKind::Catalog)?;
        record.ok_or_raise(|| ErrorKind::BackendNotFound(storage_id))
    }

    /// Replace the free-text notes of a backend.
    pub async fn set_notes(&self, storage_id: i64, notes: &str) -> Result<()> {
        // Checked first so a missing record is reported as such, not as a
        // catalog failure.
        self.get(storage_id).await?;
        self.backends.set_notes(storage_id, notes).await.or_raise(|| ErrorKind::Catalog)
    }

    /// Look up a backend record and validate it for use.
    ///
    /// Local backends go through the mount, marker and writability checks of
    /// [`LocalFilesystemBackend::open`] on the blocking pool; `prompt` is
    /// asked for an alternate mount path if the recorded one is missing.
    /// Object stores must have credentials configured and a reachable bucket.
    /// Nothing is cached; every call validates again.
    #[instrument(skip(self, prompt))]
    pub async fn resolve(&self, storage_id: i64, prompt: Arc<dyn PathPrompt>) -> Result<Endpoint> {
        let record = self.get(storage_id).await?;
        let name = format!("#{storage_id}");
        let backend: Backend = match record.kind {
            BackendKind::LocalFilesystem => {
                let (location, identity) = (record.location.clone(), record.marker_identity());
                tokio::task::spawn_blocking(move || {
                    LocalFilesystemBackend::open(name, location, &identity, prompt.as_ref())
                })
                .await
                .or_raise(|| ErrorKind::Task)?
                .or_else(validation_error)?
                .into()
            },
            BackendKind::ObjectStore => self.object_store(name, &record.location).await?.into(),
        };
        tracing::debug!(storage_id, location = %record.location, "backend validated");
        Ok(Endpoint::new(storage_id, Arc::new(backend)))
    }

    async fn object_store(&self, name: String, location: &str) -> Result<ObjectStoreBackend> {
        let location: ObjectStoreLocation = location.parse().or_else(validation_error)?;
        let Some(credentials) = self.credentials.get(&location.host) else {
            exn::bail!(ErrorKind::MissingCredentials(location.host));
        };
        let backend = ObjectStoreBackend::new(name, location, credentials);
        backend.validate().await.or_else(validation_error)?;
        Ok(backend)
    }

    /// Provision a local disk as a new backend.
    ///
    /// The mount must exist and carry no marker, README or archive directory.
    /// The record is inserted in a transaction that is only committed once
    /// every artefact has been written; if writing fails the transaction is
    /// rolled back and the artefacts created so far are removed.
    #[instrument(skip(self, notes))]
    pub async fn provision_local(
        &self,
        path: &Path,
        priority: i64,
        notes: &str,
        device_label: Option<&str>,
    ) -> Result<BackendRecord> {
        self.provision_local_with(path, priority, notes, device_label, marker::provision).await
    }

    /// [`provision_local`](Self::provision_local) with the artefact writer
    /// passed in.
    async fn provision_local_with(
        &self,
        path: &Path,
        priority: i64,
        notes: &str,
        device_label: Option<&str>,
        write_artefacts: impl FnOnce(&Path, &Marker) -> std::result::Result<(), StorageError>,
    ) -> Result<BackendRecord> {
        let mount = std::path::absolute(path).or_raise(|| ErrorKind::Validation(ValidationFailure::NoLocalPath))?;
        marker::ensure_unprovisioned(&mount).or_else(provisioning_error)?;

        let device_label = match device_label {
            Some(label) => label.to_string(),
            None => default_device_label(&mount),
        };
        let pending = self
            .backends
            .insert_pending(&NewBackend {
                kind: BackendKind::LocalFilesystem,
                location: mount.display().to_string(),
                priority,
                notes: notes.to_string(),
                device_label: Some(device_label),
            })
            .await
            .or_raise(|| ErrorKind::Catalog)?;

        let marker = Marker::new(pending.record().marker_identity());
        if let Err(err) = write_artefacts(&mount, &marker) {
            if let Err(rollback) = pending.rollback().await {
                tracing::error!(error = ?rollback, "failed to roll back backend record");
            }
            // Whatever another process put there in the meantime is theirs.
            if !matches!(err.deref(), StorageErrorKind::AlreadyProvisioned(_)) {
                marker::remove_artefacts(&mount, &marker);
            }
            return provisioning_error(err);
        }
        match pending.commit().await {
            Ok(record) => {
                tracing::info!(storage_id = record.storage_id, mount = %mount.display(), "local backend provisioned");
                Ok(record)
            },
            Err(err) => {
                marker::remove_artefacts(&mount, &marker);
                Err(err).or_raise(|| ErrorKind::Provisioning)
            },
        }
    }

    /// Register an existing object store bucket as a new backend.
    ///
    /// The bucket must be reachable with the configured credentials.
    #[instrument(skip(self, notes))]
    pub async fn provision_object_store(&self, url: &str, priority: i64, notes: &str) -> Result<BackendRecord> {
        let backend = self.object_store(url.to_string(), url).await?;
        let record = self
            .backends
            .insert(&NewBackend {
                kind: BackendKind::ObjectStore,
                location: mediashift_storage::StorageBackend::location(&backend).to_string(),
                priority,
                notes: notes.to_string(),
                device_label: None,
            })
            .await
            .or_raise(|| ErrorKind::Catalog)?;
        tracing::info!(storage_id = record.storage_id, location = %record.location, "object store backend registered");
        Ok(record)
    }
}

/// Label written into the marker when none is given: the mount's directory
/// name.
fn default_device_label(mount: &Path) -> String {
    mount
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mediashift".to_string())
}

fn validation_error<T>(err: StorageError) -> Result<T> {
    let failure = ValidationFailure::from(err.deref());
    Err(err).or_raise(|| ErrorKind::Validation(failure))
}

fn provisioning_error<T>(err: StorageError) -> Result<T> {
    let kind = match err.deref() {
        StorageErrorKind::AlreadyProvisioned(path) => ErrorKind::AlreadyProvisioned(path.clone()),
        StorageErrorKind::NoLocalPath(_) => ErrorKind::Validation(ValidationFailure::NoLocalPath),
        _ => ErrorKind::Provisioning,
    };
    Err(err).or_raise(|| kind)
}
