//! Storage backend trait and implementations.
//!
//! This module defines the `StorageBackend` trait, which provides a unified
//! interface for moving media objects in and out of object store buckets and
//! local archive disks. [`Backend`] is the closed set of production backends;
//! engines accept any [`BackendHandle`](crate::BackendHandle) so tests can
//! substitute the in-memory mock.

mod local;
#[cfg(feature = "mock")]
mod mock;
mod s3;

pub use self::local::{LocalFilesystemBackend, NoPrompt, PathPrompt};
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
pub use self::s3::ObjectStoreBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{BackendKind, Tags};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::pin::Pin;

/// Object contents as a stream of chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// Wrap an in-memory buffer as a single-chunk [`ByteStream`].
pub fn once(data: impl Into<Bytes>) -> ByteStream {
    let data = data.into();
    Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Unified interface for storage backends.
///
/// # Object Names
/// Object names are catalog keys relative to the backend root, and must be
/// validated using [`validate_object_name`](crate::validate_object_name)
/// before use. Implementations enforce this validation.
///
/// # Examples
///
/// ```
/// use mediashift_storage::{StorageBackend, error::Result};
///
/// async fn size_of(backend: &dyn StorageBackend, object: &str) -> Result<u64> {
///     if backend.exists(object).await? {
///         Ok(backend.read(object).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Name of the backend, for logging only.
    fn name(&self) -> &str;

    fn kind(&self) -> BackendKind;

    /// Location as recorded in the catalog (bucket URL or mount path).
    fn location(&self) -> &str;

    /// Fully-qualified location of an object: `s3://host/bucket/key` for
    /// object stores, an absolute path for local backends.
    fn locate(&self, object_name: &str) -> Result<String>;

    async fn exists(&self, object_name: &str) -> Result<bool>;

    /// Open an object for streaming reads.
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if the object does not
    /// exist. The setup (opening the file/request) happens before returning.
    async fn read_stream(&self, object_name: &str) -> Result<ByteStream>;

    /// Write the complete contents of `data` as `object_name`, replacing any
    /// existing object. Returns the number of bytes written.
    ///
    /// # Notes
    /// - The object must never be visible under its final name until every
    ///   byte has been written.
    /// - Implementations create parent directories as needed.
    /// - `size_hint` is used to pre-allocate buffers only.
    async fn write_stream(&self, object_name: &str, data: ByteStream, size_hint: Option<u64>) -> Result<u64>;

    /// Read the complete object into memory.
    ///
    /// Default implementation collects [`read_stream()`](Self::read_stream).
    async fn read(&self, object_name: &str) -> Result<Vec<u8>> {
        let mut stream = self.read_stream(object_name).await?;
        let mut buffer = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer)
    }

    /// Write an in-memory buffer as `object_name`.
    async fn write(&self, object_name: &str, data: &[u8]) -> Result<()> {
        let size = data.len() as u64;
        self.write_stream(object_name, once(Bytes::copy_from_slice(data)), Some(size)).await?;
        Ok(())
    }

    /// Delete an object.
    ///
    /// Returns [`NotFound`](ErrorKind::NotFound) if it does not exist (local
    /// backends; object stores treat deletes as idempotent).
    async fn remove(&self, object_name: &str) -> Result<()>;

    async fn tags_get(&self, object_name: &str) -> Result<Tags> {
        let _ = object_name;
        exn::bail!(ErrorKind::Unsupported(self.kind().as_str()))
    }

    async fn tags_set(&self, object_name: &str, tags: &Tags) -> Result<()> {
        let _ = (object_name, tags);
        exn::bail!(ErrorKind::Unsupported(self.kind().as_str()))
    }
}

/// Production storage backends.
///
/// Built by the backend registry once validation has passed.
#[derive(Debug)]
pub enum Backend {
    ObjectStore(ObjectStoreBackend),
    LocalFilesystem(LocalFilesystemBackend),
}
impl From<ObjectStoreBackend> for Backend {
    fn from(backend: ObjectStoreBackend) -> Self {
        Self::ObjectStore(backend)
    }
}
impl From<LocalFilesystemBackend> for Backend {
    fn from(backend: LocalFilesystemBackend) -> Self {
        Self::LocalFilesystem(backend)
    }
}

#[async_trait]
impl StorageBackend for Backend {
    fn name(&self) -> &str {
        match self {
            Self::ObjectStore(b) => b.name(),
            Self::LocalFilesystem(b) => b.name(),
        }
    }

    fn kind(&self) -> BackendKind {
        match self {
            Self::ObjectStore(b) => b.kind(),
            Self::LocalFilesystem(b) => b.kind(),
        }
    }

    fn location(&self) -> &str {
        match self {
            Self::ObjectStore(b) => b.location(),
            Self::LocalFilesystem(b) => b.location(),
        }
    }

    fn locate(&self, object_name: &str) -> Result<String> {
        match self {
            Self::ObjectStore(b) => b.locate(object_name),
            Self::LocalFilesystem(b) => b.locate(object_name),
        }
    }

    async fn exists(&self, object_name: &str) -> Result<bool> {
        match self {
            Self::ObjectStore(b) => b.exists(object_name).await,
            Self::LocalFilesystem(b) => b.exists(object_name).await,
        }
    }

    async fn read_stream(&self, object_name: &str) -> Result<ByteStream> {
        match self {
            Self::ObjectStore(b) => b.read_stream(object_name).await,
            Self::LocalFilesystem(b) => b.read_stream(object_name).await,
        }
    }

    async fn write_stream(&self, object_name: &str, data: ByteStream, size_hint: Option<u64>) -> Result<u64> {
        match self {
            Self::ObjectStore(b) => b.write_stream(object_name, data, size_hint).await,
            Self::LocalFilesystem(b) => b.write_stream(object_name, data, size_hint).await,
        }
    }

    async fn remove(&self, object_name: &str) -> Result<()> {
        match self {
            Self::ObjectStore(b) => b.remove(object_name).await,
            Self::LocalFilesystem(b) => b.remove(object_name).await,
        }
    }

    async fn tags_get(&self, object_name: &str) -> Result<Tags> {
        match self {
            Self::ObjectStore(b) => b.tags_get(object_name).await,
            Self::LocalFilesystem(b) => b.tags_get(object_name).await,
        }
    }

    async fn tags_set(&self, object_name: &str, tags: &Tags) -> Result<()> {
        match self {
            Self::ObjectStore(b) => b.tags_set(object_name, tags).await,
            Self::LocalFilesystem(b) => b.tags_set(object_name, tags).await,
        }
    }
}
