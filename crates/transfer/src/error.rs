//! Transfer Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The storage or catalog error that
//! caused a failure is kept as a child in the tree.

use derive_more::{Display, Error};
use mediashift_storage::error::ErrorKind as StorageErrorKind;
use std::path::PathBuf;

/// A transfer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// ### Configuration errors
/// - [`ErrorKind::MissingCredentials`], [`ErrorKind::InvalidRequest`]
///
/// ### Validation errors
/// Raised before any object is touched.
/// - [`ErrorKind::BackendNotFound`], [`ErrorKind::Validation`],
///   [`ErrorKind::TransferAborted`]
///
/// ### Per-object errors
/// Logged and reported; the run carries on with the next object.
/// - [`ErrorKind::Storage`], [`ErrorKind::Image`], [`ErrorKind::Task`],
///   [`ErrorKind::DerivedNameConflict`]
///
/// ### Fatal errors
/// - [`ErrorKind::CatalogCommit`], [`ErrorKind::AlreadyProvisioned`],
///   [`ErrorKind::Provisioning`], [`ErrorKind::Catalog`]
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A catalog query failed.
    #[display("catalog error")]
    Catalog,
    /// Reading or writing one object failed.
    #[display("storage error")]
    Storage,
    #[display("backend not found: {_0}")]
    BackendNotFound(#[error(not(source))] i64),
    /// No credentials configured for an object store host.
    #[display("no object store credentials configured for host {_0}")]
    MissingCredentials(#[error(not(source))] String),
    /// A backend could not be validated for use.
    #[display("backend validation failed: {_0}")]
    Validation(#[error(not(source))] ValidationFailure),
    /// A mount already carries backend artefacts; nothing was changed.
    #[display("already provisioned: {}", _0.display())]
    AlreadyProvisioned(#[error(not(source))] PathBuf),
    /// Provisioning failed after it started; its changes were undone.
    #[display("failed to provision backend")]
    Provisioning,
    /// Placements could not be written; the run stopped.
    #[display("failed to commit placements to the catalog")]
    CatalogCommit,
    /// The run could not start, no work was done.
    #[display("transfer aborted before it started")]
    TransferAborted,
    /// An image could not be decoded, resized or encoded.
    #[display("image processing failed")]
    Image,
    /// A blocking worker task panicked or was cancelled.
    #[display("worker task failed")]
    Task,
    /// Another image of the run would be written under the same name.
    #[display("derived object name {_0} is shared with another image")]
    DerivedNameConflict(#[error(not(source))] String),
    #[display("invalid request: {_0}")]
    InvalidRequest(#[error(not(source))] &'static str),
}

/// Why a backend failed validation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    #[display("object store unavailable")]
    Unavailable,
    #[display("mount path does not exist")]
    NoLocalPath,
    #[display("not writable")]
    NotWritable,
    #[display("marker file does not match the catalog record")]
    MarkerMismatch,
    #[display("marker file missing or unreadable")]
    InvalidMarker,
    #[display("invalid location")]
    InvalidLocation,
    #[display("unexpected storage error")]
    Other,
}
impl From<&StorageErrorKind> for ValidationFailure {
    fn from(kind: &StorageErrorKind) -> Self {
        match kind {
            StorageErrorKind::BackendUnavailable(_) | StorageErrorKind::Network(_) => Self::Unavailable,
            StorageErrorKind::NoLocalPath(_) => Self::NoLocalPath,
            StorageErrorKind::BackendNotWritable(_) | StorageErrorKind::PermissionDenied(_) => Self::NotWritable,
            StorageErrorKind::MarkerMismatch(_) => Self::MarkerMismatch,
            StorageErrorKind::InvalidMarker(_) => Self::InvalidMarker,
            StorageErrorKind::InvalidLocation(_) => Self::InvalidLocation,
            _ => Self::Other,
        }
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Task)
    }
}
