//! In-memory storage backend for testing.

use super::ByteStream;
use crate::StorageBackend;
use crate::error::{ErrorKind, Result};
use crate::models::{BackendKind, Tags};
use crate::path::validate as validate_object_name;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory storage backend for testing.
///
/// Objects are stored in a `HashMap` behind a [`RwLock`], so all trait
/// methods can operate on `&self` without external synchronisation. Reads
/// and writes are counted, and individual objects can be made to fail, so
/// engines can be tested without filesystem or network dependencies.
///
/// # Examples
///
/// ```
/// use mediashift_storage::StorageBackend;
/// use mediashift_storage::backend::MockBackend;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([
///     ("2019/IMG_0001.JPG", b"jpeg"),
/// ]);
/// assert!(backend.exists("2019/IMG_0001.JPG").await?);
///
/// backend.write("2019/IMG_0002.JPG", b"jpeg").await?;
/// assert_eq!(backend.writes(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    kind: BackendKind,
    location: String,
    storage: RwLock<HashMap<String, Bytes>>,
    tags: RwLock<HashMap<String, Tags>>,
    /// Object names whose reads and writes fail with a network error.
    failing: std::sync::RwLock<HashSet<String>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MockBackend {
    /// Create a mock backend pre-populated with objects.
    ///
    /// Panics if any name fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<String>, impl AsRef<[u8]>)>) -> Self {
        let mut map = HashMap::new();
        for (name, data) in files {
            let name = name.into();
            let Ok(validated) = validate_object_name(&name) else {
                // The panic here is DELIBERATE. MockBackend is intended to be
                // used in tests; panics are expected. There is no error result.
                panic!("MockBackend::with_files: invalid object name {name}");
            };
            map.insert(validated, Bytes::copy_from_slice(data.as_ref()));
        }
        Self {
            name: "mock".to_string(),
            kind: BackendKind::ObjectStore,
            location: "mock://".to_string(),
            storage: RwLock::new(map),
            tags: RwLock::default(),
            failing: std::sync::RwLock::default(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Change the name (and location) of the mock backend.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self.location = format!("mock://{}", self.name);
        self
    }

    /// Pretend to be a different kind of backend.
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Make every read and write of `object_name` fail.
    pub fn fail_on(self, object_name: impl Into<String>) -> Self {
        self.set_failing(object_name, true);
        self
    }

    /// Toggle failure injection for `object_name` on a live backend.
    pub fn set_failing(&self, object_name: impl Into<String>, failing: bool) {
        let Ok(mut set) = self.failing.write() else {
            panic!("MockBackend: failure set lock poisoned");
        };
        let name: String = object_name.into();
        match failing {
            true => set.insert(name),
            false => set.remove(&name),
        };
    }

    fn check_failing(&self, object_name: &str) -> Result<()> {
        let failing = self.failing.read().map(|set| set.contains(object_name)).unwrap_or(false);
        match failing {
            true => exn::bail!(ErrorKind::Network(format!("injected failure for {object_name}"))),
            false => Ok(()),
        }
    }

    /// Number of successful [`read_stream()`](StorageBackend::read_stream) calls.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful [`write_stream()`](StorageBackend::write_stream) calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Names of every stored object, sorted.
    pub async fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.storage.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn location(&self) -> &str {
        &self.location
    }

    fn locate(&self, object_name: &str) -> Result<String> {
        let name = validate_object_name(object_name)?;
        Ok(format!("{}/{}", self.location.trim_end_matches('/'), name))
    }

    async fn exists(&self, object_name: &str) -> Result<bool> {
        let name = validate_object_name(object_name)?;
        Ok(self.storage.read().await.contains_key(&name))
    }

    async fn read_stream(&self, object_name: &str) -> Result<ByteStream> {
        let name = validate_object_name(object_name)?;
        self.check_failing(&name)?;
        let data = self.storage.read().await.get(&name).cloned();
        let Some(data) = data else {
            exn::bail!(ErrorKind::NotFound(name));
        };
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(super::once(data))
    }

    async fn write_stream(&self, object_name: &str, mut data: ByteStream, size_hint: Option<u64>) -> Result<u64> {
        let name = validate_object_name(object_name)?;
        self.check_failing(&name)?;
        let mut buffer = BytesMut::with_capacity(size_hint.unwrap_or_default() as usize);
        while let Some(chunk) = data.try_next().await? {
            buffer.extend_from_slice(&chunk);
        }
        let written = buffer.len() as u64;
        self.storage.write().await.insert(name, buffer.freeze());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(written)
    }

    async fn remove(&self, object_name: &str) -> Result<()> {
        let name = validate_object_name(object_name)?;
        self.tags.write().await.remove(&name);
        match self.storage.write().await.remove(&name) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(name)),
        }
    }

    async fn tags_get(&self, object_name: &str) -> Result<Tags> {
        if self.kind != BackendKind::ObjectStore {
            exn::bail!(ErrorKind::Unsupported(self.kind.as_str()));
        }
        let name = validate_object_name(object_name)?;
        if !self.storage.read().await.contains_key(&name) {
            exn::bail!(ErrorKind::NotFound(name));
        }
        Ok(self.tags.read().await.get(&name).cloned().unwrap_or_default())
    }

    async fn tags_set(&self, object_name: &str, tags: &Tags) -> Result<()> {
        if self.kind != BackendKind::ObjectStore {
            exn::bail!(ErrorKind::Unsupported(self.kind.as_str()));
        }
        let name = validate_object_name(object_name)?;
        if !self.storage.read().await.contains_key(&name) {
            exn::bail!(ErrorKind::NotFound(name));
        }
        self.tags.write().await.insert(name, tags.clone());
        Ok(())
    }
}
