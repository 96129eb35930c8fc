//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A row could not be converted to or from its model.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// No batch with this id is defined.
    #[display("batch not found: {_0}")]
    BatchNotFound(#[error(not(source))] u32),
    /// No backend record with this storage id.
    #[display("backend not found: {_0}")]
    BackendNotFound(#[error(not(source))] i64),
    /// A bulk placement write failed; the run must stop.
    #[display("failed to commit placements to the catalog")]
    CatalogCommit,
}
