//! Local filesystem storage backend.
//!
//! Objects are stored below the archive subdirectory of a mounted disk and
//! accessed via `tokio::fs` for async I/O. The disk is bound to its catalog
//! record by a [`Marker`] file at the mount root.

use crate::backend::ByteStream;
use crate::error::{ErrorKind, Result};
use crate::marker::{Marker, MarkerIdentity};
use crate::models::BackendKind;
use crate::{StorageBackend, path::validate as validate_object_name};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

/// Name of the file written (and immediately removed) to prove the archive
/// directory accepts writes.
const PROBE_FILE_NAME: &str = ".mediashift-probe";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Asked for an alternate mount path when a local backend's recorded mount
/// does not exist (disk mounted somewhere else today).
pub trait PathPrompt: Send + Sync {
    fn alternate_mount(&self, missing: &Path) -> Option<PathBuf>;
}

/// Never offers an alternate path.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrompt;
impl PathPrompt for NoPrompt {
    fn alternate_mount(&self, _missing: &Path) -> Option<PathBuf> {
        None
    }
}

/// Local filesystem storage backend.
///
/// All object names are relative to the archive directory below the mount.
///
/// # Examples
///
/// ```no_run
/// use mediashift_storage::backend::{LocalFilesystemBackend, NoPrompt};
/// use mediashift_storage::marker::MarkerIdentity;
///
/// # fn example() -> mediashift_storage::error::Result<()> {
/// let identity = MarkerIdentity { storage_id: 3, created_at: 1_700_000_000, device_label: "ARCHIVE-03".into() };
/// let backend = LocalFilesystemBackend::open("archive-03", "/mnt/archive-03", &identity, &NoPrompt)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalFilesystemBackend {
    name: String,
    /// Mount path actually in use (may differ from the catalog record when
    /// an alternate mount was supplied).
    mount: PathBuf,
    location: String,
    /// Archive directory; every object lives below it.
    root: PathBuf,
}
impl LocalFilesystemBackend {
    /// Validate a provisioned mount and open it.
    ///
    /// Checks, in order:
    /// 1. the mount exists (otherwise `prompt` is asked for an alternate
    ///    mount; [`NoLocalPath`](ErrorKind::NoLocalPath) if none is given),
    /// 2. the mount is writable,
    /// 3. the marker file agrees with `identity` (no further I/O happens on
    ///    a [`MarkerMismatch`](ErrorKind::MarkerMismatch)),
    /// 4. the archive directory accepts a probe write.
    ///
    /// Blocking, and `prompt` may wait on the operator: async callers run it
    /// on the blocking pool.
    pub fn open(
        name: impl Into<String>,
        mount: impl AsRef<Path>,
        identity: &MarkerIdentity,
        prompt: &dyn PathPrompt,
    ) -> Result<Self> {
        let recorded = mount.as_ref();
        let mount = match recorded.is_dir() {
            true => recorded.to_path_buf(),
            false => match prompt.alternate_mount(recorded) {
                Some(alternate) if alternate.is_dir() => {
                    tracing::info!(recorded = %recorded.display(), mount = %alternate.display(), "using alternate mount path");
                    alternate
                },
                _ => exn::bail!(ErrorKind::NoLocalPath(recorded.to_path_buf())),
            },
        };

        let metadata = std::fs::metadata(&mount).map_err(|e| map_io_error(e, &mount))?;
        if metadata.permissions().readonly() {
            exn::bail!(ErrorKind::BackendNotWritable(mount));
        }

        let marker = Marker::read(&mount)?;
        marker.check(identity)?;

        let root = mount.join(&marker.archive_dir);
        Self::probe(&root)?;

        Ok(Self {
            name: name.into(),
            location: mount.display().to_string(),
            mount,
            root,
        })
    }

    /// Write and remove a probe file in the archive directory.
    fn probe(root: &Path) -> Result<()> {
        let probe = root.join(format!("{PROBE_FILE_NAME}-{}", std::process::id()));
        let not_writable = |_| ErrorKind::BackendNotWritable(root.to_path_buf());
        std::fs::write(&probe, b"probe").map_err(not_writable)?;
        std::fs::remove_file(&probe).map_err(not_writable)?;
        Ok(())
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    /// Get the absolute path for an object name.
    fn absolute_path(&self, object_name: &str) -> Result<PathBuf> {
        let validated = validate_object_name(object_name)?;
        Ok(self.root.join(validated))
    }

    /// Sibling path the object is written to before being renamed into place.
    fn temporary_path(path: &Path) -> PathBuf {
        let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let unique = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        path.with_file_name(format!(".{file_name}.{}-{unique}.partial", std::process::id()))
    }

    async fn write_temporary(temporary: &Path, mut data: ByteStream, object_name: &str) -> Result<u64> {
        let mut file = fs::File::create(temporary).await.map_err(|e| map_io_error(e, temporary))?;
        let mut written = 0u64;
        while let Some(chunk) = data.try_next().await? {
            file.write_all(&chunk).await.map_err(ErrorKind::Io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(ErrorKind::Io)?;
        file.sync_all().await.map_err(ErrorKind::Io)?;
        tracing::trace!(object = object_name, bytes = written, "object written to temporary file");
        Ok(written)
    }
}

fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
    match e.kind() {
        std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.display().to_string()),
        std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    }
}

#[async_trait]
impl StorageBackend for LocalFilesystemBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::LocalFilesystem
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn locate(&self, object_name: &str) -> Result<String> {
        Ok(self.absolute_path(object_name)?.display().to_string())
    }

    async fn exists(&self, object_name: &str) -> Result<bool> {
        let path = self.absolute_path(object_name)?;
        Ok(fs::try_exists(&path).await.map_err(ErrorKind::Io)?)
    }

    async fn read_stream(&self, object_name: &str) -> Result<ByteStream> {
        let path = self.absolute_path(object_name)?;
        let file = fs::File::open(&path).await.map_err(|e| map_io_error(e, &path))?;
        Ok(Box::pin(ReaderStream::new(file).map(|chunk| chunk.map_err(|e| exn::Exn::from(ErrorKind::Io(e))))))
    }

    async fn write_stream(&self, object_name: &str, data: ByteStream, _size_hint: Option<u64>) -> Result<u64> {
        let path = self.absolute_path(object_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| map_io_error(e, parent))?;
        }
        let temporary = Self::temporary_path(&path);
        let written = match Self::write_temporary(&temporary, data, object_name).await {
            Ok(written) => written,
            Err(err) => {
                _ = fs::remove_file(&temporary).await;
                return Err(err);
            },
        };
        if let Err(e) = fs::rename(&temporary, &path).await {
            _ = fs::remove_file(&temporary).await;
            exn::bail!(map_io_error(e, &path));
        }
        Ok(written)
    }

    async fn remove(&self, object_name: &str) -> Result<()> {
        let path = self.absolute_path(object_name)?;
        Ok(fs::remove_file(&path).await.map_err(|e| map_io_error(e, &path))?)
    }
}
