pub mod backend;
pub mod error;
pub mod marker;
mod models;
mod path;

pub use crate::backend::{Backend, ByteStream, StorageBackend};
pub use crate::models::{BackendKind, ObjectStoreCredentials, ObjectStoreLocation, Tags};
pub use crate::path::validate as validate_object_name;
use std::sync::Arc;

pub type BackendHandle = Arc<dyn StorageBackend + Send + Sync>;
