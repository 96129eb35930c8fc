//! Storage models.
//!
//! Identity types shared between the storage backends and the catalog that
//! records where they live.

use crate::error::{Error, ErrorKind, Result};
use derive_more::Display;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Object tags (object stores only).
pub type Tags = BTreeMap<String, String>;

/// The two kinds of place an object can live.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    #[display("object_store")]
    ObjectStore,
    #[display("local_filesystem")]
    LocalFilesystem,
}
impl BackendKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectStore => "object_store",
            Self::LocalFilesystem => "local_filesystem",
        }
    }
}
impl FromStr for BackendKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "object_store" | "s3" | "bucket" => Ok(Self::ObjectStore),
            "local_filesystem" | "local" | "disk" => Ok(Self::LocalFilesystem),
            _ => exn::bail!(ErrorKind::InvalidBackendKind(s.to_string())),
        }
    }
}

/// Parsed object store location, stored in the catalog as a URL naming the
/// host and bucket: `https://s3.example.org/camera-traps`.
///
/// The `s3://` scheme is accepted as an alias for `https://`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreLocation {
    /// Endpoint URL handed to the S3 client (scheme and host).
    pub endpoint: String,
    /// Host name, used to look up credentials.
    pub host: String,
    pub bucket: String,
}
impl FromStr for ObjectStoreLocation {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ErrorKind::InvalidLocation(s.to_string());
        let Some((scheme, rest)) = s.trim().split_once("://") else {
            exn::bail!(invalid());
        };
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" => "http",
            "https" | "s3" => "https",
            _ => exn::bail!(invalid()),
        };
        let Some((host, bucket)) = rest.split_once('/') else {
            exn::bail!(invalid());
        };
        let bucket = bucket.trim_matches('/');
        if host.is_empty() || bucket.is_empty() || bucket.contains('/') {
            exn::bail!(invalid());
        }
        Ok(Self {
            endpoint: format!("{scheme}://{host}"),
            host: host.to_string(),
            bucket: bucket.to_string(),
        })
    }
}
impl ObjectStoreLocation {
    /// Fully-qualified location of a key within this bucket.
    pub fn locate(&self, key: &str) -> String {
        format!("s3://{}/{}/{}", self.host, self.bucket, key)
    }
}

/// Credentials and region for one object store host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStoreCredentials {
    pub region: String,
    /// Overrides the endpoint derived from the location URL (e.g. to reach
    /// the host through a different port or scheme).
    pub endpoint: Option<String>,
    pub key_id: String,
    pub key_secret: String,
}
