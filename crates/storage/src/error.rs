//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Per-object errors
/// Failures while moving a single object; the caller logs them and moves on.
/// - [`ErrorKind::NotFound`], [`ErrorKind::Io`], [`ErrorKind::Network`],
///   [`ErrorKind::PermissionDenied`], [`ErrorKind::InvalidObjectName`]
///
/// ### Validation errors
/// Raised while preparing a backend for use; nothing has been transferred yet.
/// - [`ErrorKind::BackendUnavailable`], [`ErrorKind::NoLocalPath`],
///   [`ErrorKind::BackendNotWritable`], [`ErrorKind::MarkerMismatch`],
///   [`ErrorKind::InvalidMarker`], [`ErrorKind::InvalidLocation`]
///
/// ### Configuration errors
/// - [`ErrorKind::InvalidBackendKind`]
///
/// ### Provisioning errors
/// - [`ErrorKind::AlreadyProvisioned`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Object does not exist on the backend
    #[display("object not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Access denied (permissions or credentials)
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (S3 connections, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Object name contains invalid characters or escapes the backend root
    #[display("invalid object name: {_0}")]
    InvalidObjectName(#[error(not(source))] String),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
    /// The backend kind does not offer this capability (e.g. tags on a disk)
    #[display("operation not supported by {_0} backends")]
    Unsupported(#[error(not(source))] &'static str),
    /// Object store bucket is missing or the host is unreachable
    #[display("backend unavailable: {_0}")]
    BackendUnavailable(#[error(not(source))] String),
    /// Local mount path does not exist (and no alternate path was supplied)
    #[display("local path does not exist: {}", _0.display())]
    NoLocalPath(#[error(not(source))] PathBuf),
    /// Local mount or archive directory cannot be written to
    #[display("backend not writable: {}", _0.display())]
    BackendNotWritable(#[error(not(source))] PathBuf),
    /// Marker file disagrees with the catalog record
    #[display("marker file disagrees with catalog on {_0}")]
    MarkerMismatch(#[error(not(source))] String),
    /// Marker file missing or unparseable
    #[display("invalid marker file: {}", _0.display())]
    InvalidMarker(#[error(not(source))] PathBuf),
    /// Backend location string could not be understood
    #[display("invalid backend location: {_0}")]
    InvalidLocation(#[error(not(source))] String),
    /// Backend kind name is not one this tool knows
    #[display("unknown backend kind `{_0}`")]
    InvalidBackendKind(#[error(not(source))] String),
    /// Attempting to provision a path that already carries backend artefacts
    #[display("already provisioned: {}", _0.display())]
    AlreadyProvisioned(#[error(not(source))] PathBuf),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::BackendError(_))
    }
}
