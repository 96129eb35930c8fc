//! SQLite placement catalog.
//!
//! The catalog records which representation of which media object lives on
//! which storage backend. Unlike the objects themselves, placement rows are
//! the source of truth for every transfer: an object only counts as present
//! on a backend once its row has been committed.
//!
//! # Architecture
//! - **Backends** ([`BackendRepository`]): one record per bucket or archive
//!   disk. Immutable apart from the free-text notes.
//! - **Placements** ([`PlacementRepository`]): `(file_id, storage_id,
//!   representation)` triples, one table per media type. Rows are only ever
//!   added or rewritten, never implicitly deleted.
//! - **Batches** ([`batch`]): static selection queries yielding the objects
//!   on a source that a target does not hold yet.
//! - **Reports** ([`report`]): read-only inventories per backend.

pub mod batch;
mod db;
pub mod error;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;
mod models;
pub mod report;
mod repo;

pub use crate::batch::Batch;
pub use crate::db::Database;
pub use crate::models::{BackendRecord, Candidate, MediaType, NewBackend, Placement, Representation};
pub use crate::repo::{BackendRepository, PendingBackend, PlacementRepository, RescaleUpdate};
